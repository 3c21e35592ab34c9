use std::{sync::Arc, time::SystemTime};

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        models::{PlaybackSource, PlaybackUpdate, SessionEntity, SessionPatch, UpdateCondition},
        session_store::SessionStore,
    },
    error::ServiceError,
    services::{
        change_events,
        feed_service::{self, FeedSeed},
        session_service::load_session,
    },
    state::SharedState,
};

/// Video chosen by an advance together with the updated session.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub session: SessionEntity,
    pub video_id: String,
    pub source: PlaybackSource,
    pub queue_item_id: Option<Uuid>,
    /// Feed position after the advance, set for feed videos.
    pub feed_pointer_index: Option<usize>,
}

/// Advance playback on behalf of `caller`, who must be the current feed owner.
pub async fn advance(
    state: &SharedState,
    session_id: Uuid,
    caller: Uuid,
) -> Result<AdvanceOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    if session.current_feed_owner_id != Some(caller) {
        return Err(ServiceError::Forbidden(
            "only the feed owner can advance playback".into(),
        ));
    }
    advance_playback(state, &store, session).await
}

/// Play the queue head when there is one, otherwise the next slot of the owner's feed.
///
/// Consuming the queue item or feed slot is conditional; losing that race yields
/// [`ServiceError::Conflict`]. When both sources are empty the session is left untouched.
pub async fn advance_playback(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session: SessionEntity,
) -> Result<AdvanceOutcome, ServiceError> {
    let session_id = session.id;

    let queue = store.list_unplayed_queue(session_id).await?;
    if let Some(head) = queue.into_iter().next() {
        let item = store
            .mark_queue_item_played(head.id)
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict(format!("queue item `{}` was already played", head.id))
            })?;
        change_events::queue_item_updated(state, &item);

        let update = PlaybackUpdate {
            video_id: item.video_id.clone(),
            source: PlaybackSource::Queue,
            queue_item_id: Some(item.id),
            started_at: SystemTime::now(),
        };
        let session = start_playback(state, store, session_id, update).await?;
        return Ok(AdvanceOutcome {
            session,
            video_id: item.video_id,
            source: PlaybackSource::Queue,
            queue_item_id: Some(item.id),
            feed_pointer_index: None,
        });
    }

    let owner = session.current_feed_owner_id.ok_or_else(|| {
        ServiceError::InvalidState(format!("session `{session_id}` has no feed owner"))
    })?;
    let feed = feed_service::ensure_feed(state, store, session_id, owner, FeedSeed::Provider)
        .await?
        .feed;
    let Some(next) = feed.next_item().cloned() else {
        info!(session_id = %session_id, owner_id = %owner, "queue and feed exhausted");
        return Err(ServiceError::PlaybackExhausted);
    };

    let feed = store
        .advance_feed_pointer(session_id, owner, feed.pointer_index)
        .await?
        .ok_or_else(|| {
            ServiceError::Conflict(format!(
                "feed slot {} of `{owner}` was already consumed",
                feed.pointer_index
            ))
        })?;
    change_events::feed_updated(state, &feed);

    let update = PlaybackUpdate {
        video_id: next.video_id.clone(),
        source: PlaybackSource::Feed,
        queue_item_id: None,
        started_at: SystemTime::now(),
    };
    let session = start_playback(state, store, session_id, update).await?;
    Ok(AdvanceOutcome {
        session,
        video_id: next.video_id,
        source: PlaybackSource::Feed,
        queue_item_id: None,
        feed_pointer_index: Some(feed.pointer_index),
    })
}

async fn start_playback(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    update: PlaybackUpdate,
) -> Result<SessionEntity, ServiceError> {
    let session = store
        .update_session(session_id, SessionPatch::playback(update), UpdateCondition::Always)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))?;
    change_events::session_updated(state, &session);
    info!(
        session_id = %session_id,
        video_id = session.current_video_id.as_deref().unwrap_or_default(),
        source = ?session.current_source,
        "playback advanced"
    );
    Ok(session)
}
