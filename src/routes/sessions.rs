use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        CreateSessionRequest, FeedSummary, JoinSessionRequest, SessionJoinedResponse,
        SessionSnapshot,
    },
    error::AppError,
    services::session_service::{self, JoinedSession},
    state::SharedState,
};

/// Routes handling the session lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/{id}", get(get_session))
}

/// Open a new watch party with the caller as host and feed owner.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionJoinedResponse),
        (status = 400, description = "Invalid display name or threshold"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<SessionJoinedResponse>, AppError> {
    let joined =
        session_service::create(&state, &payload.display_name, payload.vote_threshold).await?;
    Ok(Json(joined_response(joined)))
}

/// Join an active watch party by its code.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "sessions",
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Joined session", body = SessionJoinedResponse),
        (status = 400, description = "Invalid join code or display name"),
        (status = 404, description = "No active session with this code")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<SessionJoinedResponse>, AppError> {
    let joined = session_service::join(&state, &payload.join_code, &payload.display_name).await?;
    Ok(Json(joined_response(joined)))
}

/// Snapshot of a session: roster, queue, votes and owner feed position.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let loaded = session_service::load(&state, id).await?;
    Ok(Json(SessionSnapshot {
        session: loaded.session.into(),
        participants: loaded.participants.into_iter().map(Into::into).collect(),
        queue: loaded.queue.into_iter().map(Into::into).collect(),
        votes: loaded.votes.into_iter().map(Into::into).collect(),
        owner_feed: loaded.owner_feed.as_ref().map(FeedSummary::from),
    }))
}

fn joined_response(joined: JoinedSession) -> SessionJoinedResponse {
    SessionJoinedResponse {
        session: joined.session.into(),
        participant: joined.participant.into(),
    }
}
