pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    ChatMessageEntity, FeedEntity, ParticipantEntity, QueueItemEntity, SessionEntity,
    SessionPatch, UpdateCondition, VoteEntity,
};
use crate::dao::storage::StorageResult;

/// Row store holding every durable piece of watch party state.
///
/// Each operation is atomic on the row it touches; nothing spans several rows.
/// Conditional operations return `None`/`false` when their filter matched no row,
/// which callers treat as a lost race or an idempotent no-op rather than a failure.
pub trait SessionStore: Send + Sync {
    /// Insert a session, failing with a conflict when its join code is already used
    /// by an active session.
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Find an active session by its (already normalised) join code.
    fn find_active_session_by_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Apply `patch` when `condition` holds, returning the updated row.
    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
        condition: UpdateCondition,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Set the connectivity flag, refreshing `last_seen_at` when `seen_at` is given.
    fn set_participant_connected(
        &self,
        participant_id: Uuid,
        connected: bool,
        seen_at: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;

    /// Insert a feed unless one already exists for the same (session, user) pair.
    fn insert_feed(&self, feed: FeedEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn find_feed(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>>;
    /// Move the pointer from `expected` to `expected + 1`, only while it still equals
    /// `expected` and the feed is not exhausted.
    fn advance_feed_pointer(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expected: usize,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>>;

    fn insert_queue_item(&self, item: QueueItemEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Unplayed items ordered by `created_at` then `id`.
    fn list_unplayed_queue(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QueueItemEntity>>>;
    /// Flip `played` from false to true, returning the row only when this call flipped it.
    fn mark_queue_item_played(
        &self,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QueueItemEntity>>>;
    /// Delete an unplayed item. Returns `false` when nothing matched.
    fn delete_queue_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Insert or replace the vote keyed by (session, user).
    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn list_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>>;
    /// Delete every vote of the session, returning how many rows went away.
    fn delete_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<u64>>;

    fn insert_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Messages ordered by `created_at` then `id`.
    fn list_chat_messages(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
