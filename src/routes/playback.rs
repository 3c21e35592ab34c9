use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        format_system_time,
        playback::{AdvanceRequest, AdvanceResponse},
    },
    error::AppError,
    services::playback_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/sessions/{id}/advance", post(advance))
}

/// Play the next video: the queue head first, then the owner's feed.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "playback",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = AdvanceRequest,
    responses(
        (status = 200, description = "Playback advanced", body = AdvanceResponse),
        (status = 403, description = "Caller is not the feed owner"),
        (status = 409, description = "Queue and feed exhausted, or a concurrent advance won")
    )
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AdvanceRequest>>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let outcome = playback_service::advance(&state, id, payload.participant_id).await?;
    let started_at = outcome
        .session
        .playback_started_at
        .map(format_system_time)
        .unwrap_or_default();
    Ok(Json(AdvanceResponse {
        video_id: outcome.video_id,
        source: outcome.source,
        queue_item_id: outcome.queue_item_id,
        feed_pointer_index: outcome.feed_pointer_index,
        playback_started_at: started_at,
    }))
}
