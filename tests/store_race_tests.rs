use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use futures::future::BoxFuture;
use rand::{SeedableRng, rngs::StdRng};
use uuid::Uuid;

use watch_party_back::{
    config::AppConfig,
    dao::{
        feed_provider::StaticFeedProvider,
        models::{
            ChatMessageEntity, FeedEntity, FeedItemEntity, ParticipantEntity, QueueItemEntity,
            SessionEntity, SessionPatch, UpdateCondition, VoteEntity,
        },
        session_store::{SessionStore, memory::MemorySessionStore},
        storage::StorageResult,
    },
    error::ServiceError,
    services::{
        ownership_service::{self, FailoverOutcome, VoteOutcome},
        playback_service, queue_service,
        session_service::{self, JoinedSession},
    },
    state::{AppState, SharedState},
};

/// Competing write applied to the inner store right before the matching call.
#[derive(Debug, Clone, Copy)]
enum Interference {
    /// Reassign the feed just before a conditional owner write.
    MoveOwnerTo(Uuid),
    /// Play the same queue item first.
    ConsumeQueueItem,
    /// Advance the same feed slot first.
    AdvanceFeed,
}

/// Memory store that lets a second writer win exactly one race.
#[derive(Clone)]
struct RacingStore {
    inner: MemorySessionStore,
    pending: Arc<Mutex<Option<Interference>>>,
}

impl RacingStore {
    fn new(inner: MemorySessionStore) -> Self {
        Self {
            inner,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    fn arm(&self, interference: Interference) {
        *self.pending.lock().unwrap() = Some(interference);
    }

    fn take_if(&self, wanted: impl Fn(&Interference) -> bool) -> Option<Interference> {
        let mut pending = self.pending.lock().unwrap();
        if pending.as_ref().is_some_and(wanted) {
            pending.take()
        } else {
            None
        }
    }
}

impl SessionStore for RacingStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_session(session)
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.find_session(id)
    }

    fn find_active_session_by_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.find_active_session_by_code(join_code)
    }

    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
        condition: UpdateCondition,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let interference = match condition {
            UpdateCondition::OwnerIs(_) => {
                self.take_if(|pending| matches!(pending, Interference::MoveOwnerTo(_)))
            }
            UpdateCondition::Always => None,
        };
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some(Interference::MoveOwnerTo(owner)) = interference {
                inner
                    .update_session(id, SessionPatch::owner(owner), UpdateCondition::Always)
                    .await?;
            }
            inner.update_session(id, patch, condition).await
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_participant(participant)
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        self.inner.list_participants(session_id)
    }

    fn set_participant_connected(
        &self,
        participant_id: Uuid,
        connected: bool,
        seen_at: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        self.inner
            .set_participant_connected(participant_id, connected, seen_at)
    }

    fn insert_feed(&self, feed: FeedEntity) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.insert_feed(feed)
    }

    fn find_feed(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>> {
        self.inner.find_feed(session_id, user_id)
    }

    fn advance_feed_pointer(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expected: usize,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>> {
        let interference = self.take_if(|pending| matches!(pending, Interference::AdvanceFeed));
        let inner = self.inner.clone();
        Box::pin(async move {
            if interference.is_some() {
                inner
                    .advance_feed_pointer(session_id, user_id, expected)
                    .await?;
            }
            inner
                .advance_feed_pointer(session_id, user_id, expected)
                .await
        })
    }

    fn insert_queue_item(&self, item: QueueItemEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_queue_item(item)
    }

    fn list_unplayed_queue(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QueueItemEntity>>> {
        self.inner.list_unplayed_queue(session_id)
    }

    fn mark_queue_item_played(
        &self,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QueueItemEntity>>> {
        let interference =
            self.take_if(|pending| matches!(pending, Interference::ConsumeQueueItem));
        let inner = self.inner.clone();
        Box::pin(async move {
            if interference.is_some() {
                inner.mark_queue_item_played(item_id).await?;
            }
            inner.mark_queue_item_played(item_id).await
        })
    }

    fn delete_queue_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_queue_item(session_id, item_id)
    }

    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.upsert_vote(vote)
    }

    fn list_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        self.inner.list_votes(session_id)
    }

    fn delete_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.delete_votes(session_id)
    }

    fn insert_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_chat_message(message)
    }

    fn list_chat_messages(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        self.inner.list_chat_messages(session_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

fn feed_items(ids: &[&str]) -> Vec<FeedItemEntity> {
    ids.iter()
        .map(|id| FeedItemEntity {
            video_id: (*id).to_string(),
            title: format!("Video {id}"),
            thumbnail: None,
        })
        .collect()
}

fn state_with(config: AppConfig, seed: u64) -> SharedState {
    AppState::with_rng(
        config.with_fallback_feed(feed_items(&["fallback001", "fallback002"])),
        Arc::new(StaticFeedProvider::new(feed_items(&[
            "provider001",
            "provider002",
        ]))),
        StdRng::seed_from_u64(seed),
    )
}

async fn racing_setup() -> (SharedState, RacingStore) {
    let state = state_with(AppConfig::default(), 7);
    let store = RacingStore::new(MemorySessionStore::new());
    state.install_session_store(Arc::new(store.clone())).await;
    (state, store)
}

async fn session_with_guests(state: &SharedState, guests: usize) -> (JoinedSession, Vec<Uuid>) {
    let host = session_service::create(state, "Host", Some(0.5))
        .await
        .unwrap();
    let mut ids = Vec::new();
    for index in 0..guests {
        let guest = session_service::join(state, &host.session.join_code, &format!("Guest {index}"))
            .await
            .unwrap();
        ids.push(guest.participant.id);
    }
    (host, ids)
}

#[tokio::test]
async fn vote_handover_yields_to_a_concurrent_owner_change() {
    let (state, store) = racing_setup().await;
    let (host, guests) = session_with_guests(&state, 2).await;
    let session_id = host.session.id;

    store.arm(Interference::MoveOwnerTo(guests[1]));
    let outcome = ownership_service::cast_vote(&state, session_id, guests[0], true)
        .await
        .unwrap();
    assert!(
        matches!(outcome, VoteOutcome::Superseded),
        "expected the handover to be dropped, got {outcome:?}"
    );

    let session = store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.current_feed_owner_id, Some(guests[1]));
    // The losing handover must not clear the ballot.
    let votes = store.list_votes(session_id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].user_id, guests[0]);
}

#[tokio::test]
async fn failover_yields_to_a_concurrent_owner_change() {
    let (state, store) = racing_setup().await;
    let (host, guests) = session_with_guests(&state, 2).await;
    let session_id = host.session.id;
    store
        .set_participant_connected(host.participant.id, false, None)
        .await
        .unwrap();

    store.arm(Interference::MoveOwnerTo(guests[0]));
    let outcome = ownership_service::fail_over(&state, session_id, host.participant.id)
        .await
        .unwrap();
    assert!(
        matches!(outcome, FailoverOutcome::Superseded),
        "expected the failover to be dropped, got {outcome:?}"
    );

    let session = store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.current_feed_owner_id, Some(guests[0]));
}

#[tokio::test]
async fn advancing_an_already_played_queue_item_is_a_conflict() {
    let (state, store) = racing_setup().await;
    let (host, _) = session_with_guests(&state, 0).await;
    let session_id = host.session.id;
    let item = queue_service::enqueue(&state, session_id, host.participant.id, "abcDEFghi12")
        .await
        .unwrap();

    store.arm(Interference::ConsumeQueueItem);
    let err = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");

    let session = store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.current_queue_item_id, None);
    assert_eq!(session.current_video_id, None);
    assert!(
        !store
            .list_unplayed_queue(session_id)
            .await
            .unwrap()
            .iter()
            .any(|queued| queued.id == item.id)
    );
}

#[tokio::test]
async fn advancing_an_already_consumed_feed_slot_is_a_conflict() {
    let (state, store) = racing_setup().await;
    let (host, _) = session_with_guests(&state, 0).await;
    let session_id = host.session.id;

    store.arm(Interference::AdvanceFeed);
    let err = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");

    let feed = store
        .find_feed(session_id, host.participant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(feed.pointer_index, 1);
    let session = store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.current_video_id, None);

    // The next advance plays the following slot.
    let outcome = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap();
    assert_eq!(outcome.video_id, "fallback002");
    assert_eq!(outcome.feed_pointer_index, Some(2));
}

#[tokio::test]
async fn colliding_join_code_is_redrawn() {
    let store = MemorySessionStore::new();
    let first = state_with(AppConfig::default(), 42);
    let second = state_with(AppConfig::default(), 42);
    first.install_session_store(Arc::new(store.clone())).await;
    second.install_session_store(Arc::new(store.clone())).await;

    let taken = session_service::create(&first, "First", None).await.unwrap();
    // Same seed, so the first draw repeats the code already in use.
    let retried = session_service::create(&second, "Second", None)
        .await
        .unwrap();

    assert_ne!(retried.session.join_code, taken.session.join_code);
    let found = store
        .find_active_session_by_code(retried.session.join_code.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, retried.session.id);
}

#[tokio::test]
async fn exhausting_join_code_attempts_is_a_conflict() {
    let store = MemorySessionStore::new();
    let first = state_with(AppConfig::default(), 42);
    let mut config = AppConfig::default();
    config.join_code_attempts = 1;
    let second = state_with(config, 42);
    first.install_session_store(Arc::new(store.clone())).await;
    second.install_session_store(Arc::new(store.clone())).await;

    session_service::create(&first, "First", None).await.unwrap();
    let err = session_service::create(&second, "Second", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");
}
