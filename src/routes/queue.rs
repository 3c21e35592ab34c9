use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::queue::{EnqueueRequest, QueueItemSummary, RemoveQueueItemResponse},
    error::AppError,
    services::queue_service,
    state::SharedState,
};

/// Routes managing the explicit play queue.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/queue", get(list_queue).post(enqueue))
        .route("/sessions/{id}/queue/{item_id}", delete(remove_item))
}

/// Unplayed queue items, oldest first.
#[utoipa::path(
    get,
    path = "/sessions/{id}/queue",
    tag = "queue",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Pending queue", body = [QueueItemSummary]),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn list_queue(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<QueueItemSummary>>, AppError> {
    let items = queue_service::list(&state, id).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

/// Queue a video by raw identifier or URL.
#[utoipa::path(
    post,
    path = "/sessions/{id}/queue",
    tag = "queue",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = EnqueueRequest,
    responses(
        (status = 200, description = "Video queued", body = QueueItemSummary),
        (status = 400, description = "Unrecognised video identifier")
    )
)]
pub async fn enqueue(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<EnqueueRequest>>,
) -> Result<Json<QueueItemSummary>, AppError> {
    let item = queue_service::enqueue(&state, id, payload.participant_id, &payload.video).await?;
    Ok(Json(item.into()))
}

/// Remove an unplayed item. Removing it twice is not an error.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/queue/{item_id}",
    tag = "queue",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("item_id" = Uuid, Path, description = "Queue item identifier")
    ),
    responses(
        (status = 200, description = "Removal result", body = RemoveQueueItemResponse)
    )
)]
pub async fn remove_item(
    State(state): State<SharedState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RemoveQueueItemResponse>, AppError> {
    let removed = queue_service::remove(&state, id, item_id).await?;
    Ok(Json(RemoveQueueItemResponse { removed }))
}
