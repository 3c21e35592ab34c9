use std::{sync::Arc, time::SystemTime};

use rand::{SeedableRng, rngs::StdRng};
use uuid::Uuid;

use watch_party_back::{
    config::AppConfig,
    dao::{
        feed_provider::StaticFeedProvider,
        models::{FeedItemEntity, ParticipantEntity, PlaybackSource},
        session_store::{
            SessionStore,
            memory::{MemoryFault, MemorySessionStore},
        },
    },
    error::ServiceError,
    services::{
        chat_service, membership_service,
        ownership_service::{self, FailoverOutcome, VoteOutcome, VoteReset},
        playback_service, presence_service, queue_service,
        session_service::{self, JoinedSession},
    },
    state::{AppState, SharedState},
};

fn feed_items(ids: &[&str]) -> Vec<FeedItemEntity> {
    ids.iter()
        .map(|id| FeedItemEntity {
            video_id: (*id).to_string(),
            title: format!("Video {id}"),
            thumbnail: None,
        })
        .collect()
}

async fn setup_with(
    fallback: Vec<FeedItemEntity>,
    provider: Vec<FeedItemEntity>,
    seed: u64,
) -> (SharedState, MemorySessionStore) {
    let config = AppConfig::default().with_fallback_feed(fallback);
    let state = AppState::with_rng(
        config,
        Arc::new(StaticFeedProvider::new(provider)),
        StdRng::seed_from_u64(seed),
    );
    let store = MemorySessionStore::new();
    state.install_session_store(Arc::new(store.clone())).await;
    (state, store)
}

async fn setup() -> (SharedState, MemorySessionStore) {
    setup_with(
        feed_items(&["fallback001", "fallback002"]),
        feed_items(&["provider001", "provider002", "provider003"]),
        7,
    )
    .await
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
async fn two_yes_votes_out_of_three_reassign_the_feed_and_clear_votes() {
    let (state, store) = setup().await;
    let (host, guests) = session_with_guests(&state, 3).await;
    let session_id = host.session.id;

    let first = ownership_service::cast_vote(&state, session_id, guests[0], true)
        .await
        .unwrap();
    let VoteOutcome::Recorded(tally) = first else {
        panic!("one vote out of three must not reassign, got {first:?}");
    };
    assert_eq!((tally.yes, tally.eligible), (1, 3));

    let second = ownership_service::cast_vote(&state, session_id, guests[1], true)
        .await
        .unwrap();
    let VoteOutcome::Reassigned(handover) = second else {
        panic!("two votes out of three must reassign, got {second:?}");
    };
    assert_eq!(handover.previous_owner, Some(host.participant.id));
    assert!(guests.contains(&handover.new_owner));
    assert_eq!(handover.votes, VoteReset::Cleared(2));

    assert!(store.list_votes(session_id).await.unwrap().is_empty());
    let session = store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.current_feed_owner_id, Some(handover.new_owner));
}

#[tokio::test]
async fn single_eligible_voter_reassigns_immediately() {
    let (state, _store) = setup().await;
    let (host, guests) = session_with_guests(&state, 1).await;

    let outcome = ownership_service::cast_vote(&state, host.session.id, guests[0], true)
        .await
        .unwrap();
    match outcome {
        VoteOutcome::Reassigned(handover) => assert_eq!(handover.new_owner, guests[0]),
        other => panic!("expected reassignment, got {other:?}"),
    }
}

#[tokio::test]
async fn no_votes_and_owner_votes_never_reassign() {
    let (state, _store) = setup().await;
    let (host, guests) = session_with_guests(&state, 1).await;

    let outcome = ownership_service::cast_vote(&state, host.session.id, guests[0], false)
        .await
        .unwrap();
    assert!(matches!(outcome, VoteOutcome::Recorded(_)));

    let err = ownership_service::cast_vote(&state, host.session.id, host.participant.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let err = ownership_service::cast_vote(&state, host.session.id, Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn failed_vote_reset_is_reported_but_owner_still_changes() {
    let (state, store) = setup().await;
    let (host, guests) = session_with_guests(&state, 1).await;
    store.fail_next(MemoryFault::DeleteVotes);

    let outcome = ownership_service::cast_vote(&state, host.session.id, guests[0], true)
        .await
        .unwrap();
    let VoteOutcome::Reassigned(handover) = outcome else {
        panic!("expected reassignment, got {outcome:?}");
    };
    assert_eq!(handover.votes, VoteReset::Failed);
    assert_eq!(store.list_votes(host.session.id).await.unwrap().len(), 1);

    let session = store.find_session(host.session.id).await.unwrap().unwrap();
    assert_eq!(session.current_feed_owner_id, Some(guests[0]));
}

#[tokio::test]
async fn owner_leaving_hands_the_feed_to_a_connected_participant() {
    let (state, store) = setup().await;
    let host = session_service::create(&state, "Host", None).await.unwrap();
    let session_id = host.session.id;

    // Participants inserted without a feed so the failover has to create one.
    let mut others = Vec::new();
    for name in ["Ada", "Bob"] {
        let now = SystemTime::now();
        let participant = ParticipantEntity {
            id: Uuid::new_v4(),
            session_id,
            display_name: name.into(),
            is_host: false,
            is_connected: true,
            last_seen_at: now,
            created_at: now,
        };
        store.insert_participant(participant.clone()).await.unwrap();
        others.push(participant.id);
    }

    let owner_lease = presence_service::track_participant(&state, session_id, host.participant.id)
        .await
        .unwrap();
    let _ada = presence_service::track_participant(&state, session_id, others[0])
        .await
        .unwrap();
    let _bob = presence_service::track_participant(&state, session_id, others[1])
        .await
        .unwrap();

    owner_lease.release().await;

    let session = store.find_session(session_id).await.unwrap().unwrap();
    let new_owner = session.current_feed_owner_id.unwrap();
    assert!(others.contains(&new_owner));

    let feed = store.find_feed(session_id, new_owner).await.unwrap().unwrap();
    assert_eq!(feed.pointer_index, 0);
    assert_eq!(feed.items[0].video_id, "provider001");

    let participants = store.list_participants(session_id).await.unwrap();
    let host_row = participants
        .iter()
        .find(|participant| participant.id == host.participant.id)
        .unwrap();
    assert!(!host_row.is_connected);
}

#[tokio::test]
async fn owner_leaving_alone_keeps_the_owner() {
    let (state, _store) = setup().await;
    let host = session_service::create(&state, "Host", None).await.unwrap();

    let outcome = membership_service::on_leave(&state, host.session.id, host.participant.id)
        .await
        .unwrap();
    assert!(matches!(outcome, FailoverOutcome::Kept(_)));
}

#[tokio::test]
async fn presence_sync_is_idempotent() {
    let (state, _store) = setup().await;
    let (host, guests) = session_with_guests(&state, 2).await;
    let present = vec![host.participant.id, guests[0]];

    let changed = membership_service::on_sync(&state, host.session.id, &present)
        .await
        .unwrap();
    assert_eq!(changed, 1);
    let changed = membership_service::on_sync(&state, host.session.id, &present)
        .await
        .unwrap();
    assert_eq!(changed, 0);
}

#[tokio::test]
async fn exhausted_queue_and_feed_leave_the_current_video_unchanged() {
    let (state, store) = setup_with(
        feed_items(&["onlyvideo01"]),
        feed_items(&["onlyvideo01"]),
        1,
    )
    .await;
    let host = session_service::create(&state, "Host", None).await.unwrap();
    let session_id = host.session.id;

    let outcome = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap();
    assert_eq!(outcome.video_id, "onlyvideo01");
    assert_eq!(outcome.source, PlaybackSource::Feed);
    assert_eq!(outcome.feed_pointer_index, Some(1));

    let err = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PlaybackExhausted));

    let session = store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.current_video_id.as_deref(), Some("onlyvideo01"));
}

#[tokio::test]
async fn queue_is_played_first_in_arrival_order() {
    let (state, _store) = setup().await;
    let (host, guests) = session_with_guests(&state, 1).await;
    let session_id = host.session.id;

    let first = queue_service::enqueue(&state, session_id, guests[0], "https://youtu.be/abcDEFghi12")
        .await
        .unwrap();
    let second = queue_service::enqueue(
        &state,
        session_id,
        host.participant.id,
        "https://www.youtube.com/watch?v=zyxWVUtsr98&t=3",
    )
    .await
    .unwrap();
    assert_eq!(queue_service::list(&state, session_id).await.unwrap().len(), 2);

    let played = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap();
    assert_eq!(played.source, PlaybackSource::Queue);
    assert_eq!(played.queue_item_id, Some(first.id));

    let played = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap();
    assert_eq!(played.video_id, second.video_id);

    let played = playback_service::advance(&state, session_id, host.participant.id)
        .await
        .unwrap();
    assert_eq!(played.source, PlaybackSource::Feed);
    assert_eq!(played.video_id, "fallback001");
    assert!(queue_service::list(&state, session_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_the_owner_may_advance() {
    let (state, _store) = setup().await;
    let (host, guests) = session_with_guests(&state, 1).await;

    let err = playback_service::advance(&state, host.session.id, guests[0])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn malformed_video_ids_are_rejected_before_storage() {
    let (state, store) = setup().await;
    let host = session_service::create(&state, "Host", None).await.unwrap();
    let session_id = host.session.id;

    let err = queue_service::enqueue(
        &state,
        session_id,
        host.participant.id,
        "https://youtu.be/abcDEFghi123",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let item = queue_service::enqueue(&state, session_id, host.participant.id, "abcDEFghi12")
        .await
        .unwrap();
    assert_eq!(item.video_id, "abcDEFghi12");
    assert_eq!(store.list_unplayed_queue(session_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn removing_a_queue_item_twice_is_a_no_op() {
    let (state, _store) = setup().await;
    let host = session_service::create(&state, "Host", None).await.unwrap();
    let item = queue_service::enqueue(
        &state,
        host.session.id,
        host.participant.id,
        "https://youtube.com/shorts/abcDEFghi12",
    )
    .await
    .unwrap();

    assert!(queue_service::remove(&state, host.session.id, item.id).await.unwrap());
    assert!(!queue_service::remove(&state, host.session.id, item.id).await.unwrap());
}

#[tokio::test]
async fn join_codes_are_case_insensitive_and_unknown_codes_are_not_found() {
    let (state, _store) = setup().await;
    let host = session_service::create(&state, "Host", None).await.unwrap();

    let lowercase = host.session.join_code.to_lowercase();
    let guest = session_service::join(&state, &format!("  {lowercase} "), "Guest")
        .await
        .unwrap();
    assert_eq!(guest.session.id, host.session.id);
    assert!(!guest.participant.is_host);

    let err = session_service::join(&state, "ZZZZZZ", "Guest").await;
    if host.session.join_code != "ZZZZZZ" {
        assert!(matches!(err, Err(ServiceError::NotFound(_))));
    }

    let err = session_service::join(&state, "", "Guest").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn loading_a_session_returns_the_owner_feed() {
    let (state, _store) = setup().await;
    let (host, _guests) = session_with_guests(&state, 2).await;

    let loaded = session_service::load(&state, host.session.id).await.unwrap();
    assert_eq!(loaded.participants.len(), 3);
    let feed = loaded.owner_feed.unwrap();
    assert_eq!(feed.user_id, host.participant.id);
    assert_eq!(feed.items[0].video_id, "fallback001");

    let err = session_service::load(&state, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn chat_messages_are_trimmed_and_broadcast() {
    let (state, _store) = setup().await;
    let host = session_service::create(&state, "Host", None).await.unwrap();
    let mut changes = state.changes().subscribe(host.session.id);

    let message = chat_service::send(&state, host.session.id, host.participant.id, "  hello  ")
        .await
        .unwrap();
    assert_eq!(message.message, "hello");

    let event = changes.recv().await.unwrap();
    assert_eq!(event.event.as_deref(), Some("chat_messages.insert"));

    let err = chat_service::send(&state, host.session.id, host.participant.id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let history = chat_service::history(&state, host.session.id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn degraded_mode_rejects_operations() {
    let state = AppState::new(
        AppConfig::default(),
        Arc::new(StaticFeedProvider::new(Vec::new())),
    );
    let err = session_service::create(&state, "Host", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
}
