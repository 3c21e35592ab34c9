use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{services::presence_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sessions/{id}/presence",
    tag = "presence",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a presence WebSocket for one session.
pub async fn presence_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| presence_service::handle_socket(state, id, socket))
}

/// Configure the presence WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/presence", get(presence_handler))
}
