use std::{sync::Arc, time::SystemTime};

use rand::{Rng, rngs::StdRng};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            FeedEntity, ParticipantEntity, PlaybackSource, QueueItemEntity, SessionEntity,
            SessionPatch, UpdateCondition, VoteEntity,
        },
        session_store::SessionStore,
    },
    dto::validation::{
        JOIN_CODE_LEN, normalize_join_code, validate_display_name, validate_join_code,
        validate_vote_threshold,
    },
    error::ServiceError,
    services::{
        change_events,
        feed_service::{self, FeedSeed},
    },
    state::SharedState,
};

const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Session and participant created for the caller.
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub session: SessionEntity,
    pub participant: ParticipantEntity,
}

/// Full view of a session used to render it.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub session: SessionEntity,
    pub participants: Vec<ParticipantEntity>,
    pub queue: Vec<QueueItemEntity>,
    pub votes: Vec<VoteEntity>,
    pub owner_feed: Option<FeedEntity>,
}

/// Draw a random join code made of uppercase letters and digits.
pub fn generate_join_code(rng: &mut StdRng) -> String {
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Open a new session with the caller as host and initial feed owner.
pub async fn create(
    state: &SharedState,
    display_name: &str,
    vote_threshold: Option<f64>,
) -> Result<JoinedSession, ServiceError> {
    validate_display_name(display_name)?;
    if let Some(threshold) = vote_threshold {
        validate_vote_threshold(threshold)?;
    }

    let store = state.require_session_store().await?;
    let now = SystemTime::now();
    let threshold = vote_threshold.unwrap_or(state.config().default_vote_threshold);
    let session_id = Uuid::new_v4();

    let session = insert_with_fresh_code(state, &store, session_id, threshold, now).await?;
    change_events::session_inserted(state, &session);

    let host = ParticipantEntity {
        id: Uuid::new_v4(),
        session_id,
        display_name: display_name.trim().to_string(),
        is_host: true,
        is_connected: true,
        last_seen_at: now,
        created_at: now,
    };
    store.insert_participant(host.clone()).await?;
    change_events::participant_inserted(state, &host);

    let patch = SessionPatch {
        host_id: Some(host.id),
        current_feed_owner_id: Some(host.id),
        playback: None,
    };
    let session = store
        .update_session(session_id, patch, UpdateCondition::Always)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))?;
    change_events::session_updated(state, &session);

    feed_service::ensure_feed(state, &store, session_id, host.id, FeedSeed::Fallback).await?;

    info!(
        session_id = %session.id,
        join_code = %session.join_code,
        host_id = %host.id,
        "session created"
    );

    Ok(JoinedSession {
        session,
        participant: host,
    })
}

async fn insert_with_fresh_code(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    vote_threshold: f64,
    now: SystemTime,
) -> Result<SessionEntity, ServiceError> {
    let attempts = state.config().join_code_attempts.max(1);

    for attempt in 1..=attempts {
        let join_code = state.use_rng(generate_join_code).await;
        let session = SessionEntity {
            id: session_id,
            join_code: join_code.clone(),
            host_id: None,
            current_feed_owner_id: None,
            current_video_id: None,
            current_queue_item_id: None,
            current_source: PlaybackSource::None,
            playback_started_at: None,
            vote_threshold,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match store.insert_session(session.clone()).await {
            Ok(()) => return Ok(session),
            Err(err) if err.is_conflict() => {
                warn!(attempt, join_code = %join_code, "join code already in use; drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(format!(
        "no free join code after {attempts} attempts"
    )))
}

/// Join the active session identified by `join_code` as a new participant.
pub async fn join(
    state: &SharedState,
    join_code: &str,
    display_name: &str,
) -> Result<JoinedSession, ServiceError> {
    validate_join_code(join_code)?;
    validate_display_name(display_name)?;

    let store = state.require_session_store().await?;
    let code = normalize_join_code(join_code);

    let session = store
        .find_active_session_by_code(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no active session with code `{code}`")))?;

    let now = SystemTime::now();
    let participant = ParticipantEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        display_name: display_name.trim().to_string(),
        is_host: false,
        is_connected: true,
        last_seen_at: now,
        created_at: now,
    };
    store.insert_participant(participant.clone()).await?;
    change_events::participant_inserted(state, &participant);

    feed_service::ensure_feed(state, &store, session.id, participant.id, FeedSeed::Fallback)
        .await?;

    info!(
        session_id = %session.id,
        participant_id = %participant.id,
        "participant joined session"
    );

    Ok(JoinedSession {
        session,
        participant,
    })
}

/// Load everything needed to render a session, creating the owner's feed when missing.
pub async fn load(state: &SharedState, session_id: Uuid) -> Result<LoadedSession, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    let participants = store.list_participants(session_id).await?;
    let queue = store.list_unplayed_queue(session_id).await?;
    let votes = store.list_votes(session_id).await?;

    let owner_feed = match session.current_feed_owner_id {
        Some(owner) => Some(
            feed_service::ensure_feed(state, &store, session_id, owner, FeedSeed::Provider)
                .await?
                .feed,
        ),
        None => None,
    };

    Ok(LoadedSession {
        session,
        participants,
        queue,
        votes,
        owner_feed,
    })
}

/// Fetch a session row or fail with [`ServiceError::NotFound`].
pub(crate) async fn load_session(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))
}

/// Ensure `participant_id` is a member of the session and return its row.
pub(crate) async fn require_participant(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<ParticipantEntity, ServiceError> {
    store
        .list_participants(session_id)
        .await?
        .into_iter()
        .find(|participant| participant.id == participant_id)
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "participant `{participant_id}` is not part of session `{session_id}`"
            ))
        })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn generated_codes_are_valid_join_codes() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..32 {
            let code = generate_join_code(&mut rng);
            assert_eq!(code.len(), JOIN_CODE_LEN);
            assert!(validate_join_code(&code).is_ok());
            assert_eq!(code, code.to_ascii_uppercase());
        }
    }
}
