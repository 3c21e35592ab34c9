//! Process-local [`SessionStore`] backed by concurrent hash maps.
//!
//! Every operation locks a single map shard for a single row, which matches the
//! per-row atomicity the coordination services are written against.

use std::{sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    models::{
        ChatMessageEntity, FeedEntity, ParticipantEntity, QueueItemEntity, SessionEntity,
        SessionPatch, UpdateCondition, VoteEntity,
    },
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// Operations whose next invocation can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryFault {
    UpdateSession,
    DeleteVotes,
    InsertFeed,
    UpsertVote,
}

/// Error returned by an operation armed with [`MemorySessionStore::fail_next`].
#[derive(Debug, Error)]
#[error("injected {0:?} failure")]
pub struct InjectedFault(MemoryFault);

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<Uuid, SessionEntity>,
    join_codes: DashMap<String, Uuid>,
    participants: DashMap<Uuid, ParticipantEntity>,
    feeds: DashMap<(Uuid, Uuid), FeedEntity>,
    queue: DashMap<Uuid, QueueItemEntity>,
    votes: DashMap<(Uuid, Uuid), VoteEntity>,
    chat: DashMap<Uuid, ChatMessageEntity>,
    faults: DashMap<MemoryFault, ()>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of the given operation fail as if the backend were down.
    pub fn fail_next(&self, fault: MemoryFault) {
        self.inner.faults.insert(fault, ());
    }
}

impl MemoryInner {
    fn check_fault(&self, fault: MemoryFault) -> StorageResult<()> {
        match self.faults.remove(&fault) {
            Some(_) => Err(StorageError::unavailable(
                format!("{fault:?} failed"),
                InjectedFault(fault),
            )),
            None => Ok(()),
        }
    }

    fn is_active_session(&self, id: &Uuid) -> bool {
        self.sessions
            .get(id)
            .map(|session| session.is_active)
            .unwrap_or(false)
    }

    fn insert_session(&self, session: SessionEntity) -> StorageResult<()> {
        match self.join_codes.entry(session.join_code.clone()) {
            Entry::Occupied(mut entry) => {
                if self.is_active_session(entry.get()) {
                    return Err(StorageError::conflict(format!(
                        "join code `{}` already in use",
                        session.join_code
                    )));
                }
                entry.insert(session.id);
            }
            Entry::Vacant(entry) => {
                entry.insert(session.id);
            }
        }
        self.sessions.insert(session.id, session);
        Ok(())
    }

    fn find_active_session_by_code(&self, join_code: &str) -> Option<SessionEntity> {
        let id = *self.join_codes.get(join_code)?;
        self.sessions
            .get(&id)
            .filter(|session| session.is_active)
            .map(|session| session.clone())
    }

    fn update_session(
        &self,
        id: Uuid,
        patch: &SessionPatch,
        condition: UpdateCondition,
    ) -> StorageResult<Option<SessionEntity>> {
        self.check_fault(MemoryFault::UpdateSession)?;
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if !condition.matches(&session) {
            return Ok(None);
        }
        patch.apply_to(&mut session, SystemTime::now());
        Ok(Some(session.clone()))
    }

    fn list_participants(&self, session_id: Uuid) -> Vec<ParticipantEntity> {
        let mut participants: Vec<_> = self
            .participants
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        participants.sort_by_key(|p| (p.created_at, p.id));
        participants
    }

    fn set_participant_connected(
        &self,
        participant_id: Uuid,
        connected: bool,
        seen_at: Option<SystemTime>,
    ) -> Option<ParticipantEntity> {
        let mut participant = self.participants.get_mut(&participant_id)?;
        participant.is_connected = connected;
        if let Some(seen_at) = seen_at {
            participant.last_seen_at = seen_at;
        }
        Some(participant.clone())
    }

    fn insert_feed(&self, feed: FeedEntity) -> StorageResult<bool> {
        self.check_fault(MemoryFault::InsertFeed)?;
        match self.feeds.entry((feed.session_id, feed.user_id)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(feed);
                Ok(true)
            }
        }
    }

    fn advance_feed_pointer(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expected: usize,
    ) -> Option<FeedEntity> {
        let mut feed = self.feeds.get_mut(&(session_id, user_id))?;
        if feed.pointer_index != expected || feed.is_exhausted() {
            return None;
        }
        feed.pointer_index += 1;
        feed.updated_at = SystemTime::now();
        Some(feed.clone())
    }

    fn list_unplayed_queue(&self, session_id: Uuid) -> Vec<QueueItemEntity> {
        let mut items: Vec<_> = self
            .queue
            .iter()
            .filter(|entry| entry.session_id == session_id && !entry.played)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by_key(|item| (item.created_at, item.id));
        items
    }

    fn mark_queue_item_played(&self, item_id: Uuid) -> Option<QueueItemEntity> {
        let mut item = self.queue.get_mut(&item_id)?;
        if item.played {
            return None;
        }
        item.played = true;
        Some(item.clone())
    }

    fn delete_queue_item(&self, session_id: Uuid, item_id: Uuid) -> bool {
        self.queue
            .remove_if(&item_id, |_, item| {
                item.session_id == session_id && !item.played
            })
            .is_some()
    }

    fn list_votes(&self, session_id: Uuid) -> Vec<VoteEntity> {
        let mut votes: Vec<_> = self
            .votes
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        votes.sort_by_key(|vote| (vote.updated_at, vote.user_id));
        votes
    }

    fn delete_votes(&self, session_id: Uuid) -> StorageResult<u64> {
        self.check_fault(MemoryFault::DeleteVotes)?;
        let mut deleted = 0u64;
        self.votes.retain(|(sid, _), _| {
            if *sid == session_id {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    fn list_chat_messages(&self, session_id: Uuid) -> Vec<ChatMessageEntity> {
        let mut messages: Vec<_> = self
            .chat
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by_key(|message| (message.created_at, message.id));
        messages
    }
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_session(session) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.sessions.get(&id).map(|s| s.clone())) })
    }

    fn find_active_session_by_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.find_active_session_by_code(&join_code)) })
    }

    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
        condition: UpdateCondition,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.update_session(id, &patch, condition) })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.participants.insert(participant.id, participant);
            Ok(())
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_participants(session_id)) })
    }

    fn set_participant_connected(
        &self,
        participant_id: Uuid,
        connected: bool,
        seen_at: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner.set_participant_connected(participant_id, connected, seen_at))
        })
    }

    fn insert_feed(&self, feed: FeedEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_feed(feed) })
    }

    fn find_feed(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .feeds
                .get(&(session_id, user_id))
                .map(|feed| feed.clone()))
        })
    }

    fn advance_feed_pointer(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expected: usize,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.advance_feed_pointer(session_id, user_id, expected)) })
    }

    fn insert_queue_item(&self, item: QueueItemEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.queue.insert(item.id, item);
            Ok(())
        })
    }

    fn list_unplayed_queue(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QueueItemEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_unplayed_queue(session_id)) })
    }

    fn mark_queue_item_played(
        &self,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QueueItemEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.mark_queue_item_played(item_id)) })
    }

    fn delete_queue_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.delete_queue_item(session_id, item_id)) })
    }

    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check_fault(MemoryFault::UpsertVote)?;
            inner.votes.insert((vote.session_id, vote.user_id), vote);
            Ok(())
        })
    }

    fn list_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_votes(session_id)) })
    }

    fn delete_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.delete_votes(session_id) })
    }

    fn insert_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.chat.insert(message.id, message);
            Ok(())
        })
    }

    fn list_chat_messages(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_chat_messages(session_id)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::models::{FeedItemEntity, PlaybackSource};

    fn session(join_code: &str) -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id: Uuid::new_v4(),
            join_code: join_code.into(),
            host_id: None,
            current_feed_owner_id: None,
            current_video_id: None,
            current_queue_item_id: None,
            current_source: PlaybackSource::None,
            playback_started_at: None,
            vote_threshold: 0.5,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn queue_item(session_id: Uuid, video_id: &str, created_at: SystemTime) -> QueueItemEntity {
        QueueItemEntity {
            id: Uuid::now_v7(),
            session_id,
            video_id: video_id.into(),
            title: None,
            thumbnail_url: None,
            added_by: Uuid::new_v4(),
            played: false,
            created_at,
        }
    }

    fn item(video_id: &str) -> FeedItemEntity {
        FeedItemEntity {
            video_id: video_id.into(),
            title: video_id.into(),
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn duplicate_join_code_is_a_conflict() {
        let store = MemorySessionStore::new();
        store.insert_session(session("ABC123")).await.unwrap();

        let err = store.insert_session(session("ABC123")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn owner_condition_rejects_stale_writes() {
        let store = MemorySessionStore::new();
        let mut row = session("OWNER1");
        let owner = Uuid::new_v4();
        row.current_feed_owner_id = Some(owner);
        let id = row.id;
        store.insert_session(row).await.unwrap();

        let first = Uuid::new_v4();
        let applied = store
            .update_session(
                id,
                SessionPatch::owner(first),
                UpdateCondition::OwnerIs(Some(owner)),
            )
            .await
            .unwrap();
        assert_eq!(applied.unwrap().current_feed_owner_id, Some(first));

        let stale = store
            .update_session(
                id,
                SessionPatch::owner(Uuid::new_v4()),
                UpdateCondition::OwnerIs(Some(owner)),
            )
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn queue_lists_unplayed_items_in_arrival_order() {
        let store = MemorySessionStore::new();
        let session_id = Uuid::new_v4();
        let base = SystemTime::now();
        let late = queue_item(session_id, "bbbbbbbbbbb", base + Duration::from_secs(2));
        let early = queue_item(session_id, "aaaaaaaaaaa", base);
        store.insert_queue_item(late.clone()).await.unwrap();
        store.insert_queue_item(early.clone()).await.unwrap();

        let listed = store.list_unplayed_queue(session_id).await.unwrap();
        assert_eq!(listed, vec![early.clone(), late.clone()]);

        assert!(store.mark_queue_item_played(early.id).await.unwrap().is_some());
        assert!(store.mark_queue_item_played(early.id).await.unwrap().is_none());
        let listed = store.list_unplayed_queue(session_id).await.unwrap();
        assert_eq!(listed, vec![late]);
    }

    #[tokio::test]
    async fn deleting_a_queue_item_twice_is_a_no_op() {
        let store = MemorySessionStore::new();
        let session_id = Uuid::new_v4();
        let entry = queue_item(session_id, "aaaaaaaaaaa", SystemTime::now());
        store.insert_queue_item(entry.clone()).await.unwrap();

        assert!(store.delete_queue_item(session_id, entry.id).await.unwrap());
        assert!(!store.delete_queue_item(session_id, entry.id).await.unwrap());
    }

    #[tokio::test]
    async fn feed_pointer_never_passes_the_end() {
        let store = MemorySessionStore::new();
        let (session_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        let feed = FeedEntity::new(session_id, user_id, vec![item("aaaaaaaaaaa")]);
        assert!(store.insert_feed(feed.clone()).await.unwrap());
        assert!(!store.insert_feed(feed).await.unwrap());

        // Stale expectation loses.
        assert!(
            store
                .advance_feed_pointer(session_id, user_id, 3)
                .await
                .unwrap()
                .is_none()
        );
        let advanced = store
            .advance_feed_pointer(session_id, user_id, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(advanced.pointer_index, 1);
        assert!(advanced.is_exhausted());
        assert!(
            store
                .advance_feed_pointer(session_id, user_id, 1)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn votes_are_upserted_per_user_and_reset_idempotently() {
        let store = MemorySessionStore::new();
        let (session_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        let vote = |value| VoteEntity {
            session_id,
            user_id,
            vote: value,
            updated_at: SystemTime::now(),
        };
        store.upsert_vote(vote(true)).await.unwrap();
        store.upsert_vote(vote(false)).await.unwrap();

        let votes = store.list_votes(session_id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert!(!votes[0].vote);

        assert_eq!(store.delete_votes(session_id).await.unwrap(), 1);
        assert_eq!(store.delete_votes(session_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn vote_reset_counts_only_the_target_session() {
        let store = MemorySessionStore::new();
        let (target, other) = (Uuid::new_v4(), Uuid::new_v4());
        let vote = |session_id| VoteEntity {
            session_id,
            user_id: Uuid::new_v4(),
            vote: true,
            updated_at: SystemTime::now(),
        };
        store.upsert_vote(vote(target)).await.unwrap();
        store.upsert_vote(vote(target)).await.unwrap();
        for _ in 0..3 {
            store.upsert_vote(vote(other)).await.unwrap();
        }

        assert_eq!(store.delete_votes(target).await.unwrap(), 2);
        assert!(store.list_votes(target).await.unwrap().is_empty());
        assert_eq!(store.list_votes(other).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let store = MemorySessionStore::new();
        store.fail_next(MemoryFault::DeleteVotes);
        let session_id = Uuid::new_v4();

        assert!(store.delete_votes(session_id).await.is_err());
        assert!(store.delete_votes(session_id).await.is_ok());
    }
}
