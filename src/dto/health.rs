use serde::Serialize;
use utoipa::ToSchema;

/// Liveness payload returned by `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" while no session store is reachable.
    pub status: String,
    /// Sessions that currently have at least one change feed subscriber hub.
    pub streamed_sessions: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, streamed_sessions: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            streamed_sessions,
        }
    }
}
