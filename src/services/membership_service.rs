use std::{collections::HashSet, time::SystemTime};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::{
        change_events,
        ownership_service::{self, FailoverOutcome},
    },
    state::{PresenceEvent, SharedState},
};

/// Reconcile every participant's connectivity flag with the present set.
///
/// Rows already matching are left alone, so replaying the same sync is a no-op.
/// Returns how many rows changed.
pub async fn on_sync(
    state: &SharedState,
    session_id: Uuid,
    present: &[Uuid],
) -> Result<usize, ServiceError> {
    let store = state.require_session_store().await?;
    let present: HashSet<Uuid> = present.iter().copied().collect();
    let mut changed = 0;

    for participant in store.list_participants(session_id).await? {
        let connected = present.contains(&participant.id);
        if participant.is_connected == connected {
            continue;
        }
        if let Some(updated) = store
            .set_participant_connected(participant.id, connected, None)
            .await?
        {
            change_events::participant_updated(state, &updated);
            changed += 1;
        }
    }

    debug!(session_id = %session_id, changed, "presence sync reconciled");
    Ok(changed)
}

/// Mark the participant connected and refresh its last seen time.
pub async fn on_join(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    if let Some(updated) = store
        .set_participant_connected(participant_id, true, Some(SystemTime::now()))
        .await?
    {
        change_events::participant_updated(state, &updated);
    } else {
        debug!(session_id = %session_id, participant_id = %participant_id, "join for unknown participant");
    }
    Ok(())
}

/// Mark the participant disconnected and hand the feed over when it owned it.
pub async fn on_leave(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<FailoverOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    if let Some(updated) = store
        .set_participant_connected(participant_id, false, Some(SystemTime::now()))
        .await?
    {
        change_events::participant_updated(state, &updated);
    }
    ownership_service::fail_over(state, session_id, participant_id).await
}

/// Broadcast presence events and run the matching handler for each of them in order.
///
/// Handler failures are logged; presence keeps flowing for the other events.
pub async fn apply_presence_events(
    state: &SharedState,
    session_id: Uuid,
    events: Vec<PresenceEvent>,
) {
    for event in events {
        let result = match event {
            PresenceEvent::Sync(present) => {
                change_events::presence_synced(state, session_id, &present);
                on_sync(state, session_id, &present).await.map(|_| ())
            }
            PresenceEvent::Join(participant_id) => {
                change_events::presence_joined(state, session_id, participant_id);
                on_join(state, session_id, participant_id).await
            }
            PresenceEvent::Leave(participant_id) => {
                change_events::presence_left(state, session_id, participant_id);
                on_leave(state, session_id, participant_id).await.map(|_| ())
            }
        };

        if let Err(err) = result {
            warn!(session_id = %session_id, error = %err, "failed to apply presence event");
        }
    }
}
