use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::chat::{ChatMessageSummary, SendChatRequest},
    error::AppError,
    services::chat_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/sessions/{id}/chat", get(history).post(send_message))
}

/// Chat history, oldest first.
#[utoipa::path(
    get,
    path = "/sessions/{id}/chat",
    tag = "chat",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Chat history", body = [ChatMessageSummary]),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn history(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessageSummary>>, AppError> {
    let messages = chat_service::history(&state, id).await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/chat",
    tag = "chat",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SendChatRequest,
    responses(
        (status = 200, description = "Message posted", body = ChatMessageSummary),
        (status = 400, description = "Empty message or unknown participant")
    )
)]
pub async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SendChatRequest>>,
) -> Result<Json<ChatMessageSummary>, AppError> {
    let message =
        chat_service::send(&state, id, payload.participant_id, &payload.message).await?;
    Ok(Json(message.into()))
}
