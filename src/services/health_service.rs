use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the session store and report whether the backend runs degraded.
///
/// A failed probe only logs; the supervisor owns the degraded flag.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.session_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "session store health check failed");
            }
        }
        None => warn!("session store unavailable (degraded mode)"),
    }

    HealthResponse::new(state.is_degraded().await, state.changes().session_count())
}
