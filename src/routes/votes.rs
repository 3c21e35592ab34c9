use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::vote::{CastVoteRequest, VoteResponse, VoteResult},
    error::AppError,
    services::ownership_service::{self, VoteOutcome, VoteReset},
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/sessions/{id}/votes", post(cast_vote))
}

/// Upsert the caller's vote; enough "yes" votes hand the feed to somebody else.
#[utoipa::path(
    post,
    path = "/sessions/{id}/votes",
    tag = "votes",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteResponse),
        (status = 400, description = "Caller is the owner or not a participant"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CastVoteRequest>>,
) -> Result<Json<VoteResponse>, AppError> {
    let outcome =
        ownership_service::cast_vote(&state, id, payload.participant_id, payload.vote).await?;

    let response = match outcome {
        VoteOutcome::Recorded(tally) => VoteResponse {
            result: VoteResult::Recorded,
            yes_votes: Some(tally.yes),
            eligible_voters: Some(tally.eligible),
            new_owner_id: None,
            votes_cleared: None,
        },
        VoteOutcome::Reassigned(handover) => VoteResponse {
            result: VoteResult::Reassigned,
            yes_votes: None,
            eligible_voters: None,
            new_owner_id: Some(handover.new_owner),
            votes_cleared: Some(!matches!(handover.votes, VoteReset::Failed)),
        },
        VoteOutcome::Superseded => VoteResponse {
            result: VoteResult::Superseded,
            yes_votes: None,
            eligible_voters: None,
            new_owner_id: None,
            votes_cleared: None,
        },
    };
    Ok(Json(response))
}
