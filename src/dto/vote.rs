use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::VoteEntity, dto::format_system_time};

/// Request upserting the caller's vote.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CastVoteRequest {
    pub participant_id: Uuid,
    /// `true` asks for the feed to move to somebody else.
    pub vote: bool,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct VoteSummary {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub vote: bool,
    pub updated_at: String,
}

impl From<VoteEntity> for VoteSummary {
    fn from(vote: VoteEntity) -> Self {
        Self {
            session_id: vote.session_id,
            user_id: vote.user_id,
            vote: vote.vote,
            updated_at: format_system_time(vote.updated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteResult {
    /// The vote was stored without changing the owner.
    Recorded,
    /// The vote pushed the tally over the threshold and the feed moved.
    Reassigned,
    /// Another transition changed the owner first.
    Superseded,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    pub result: VoteResult,
    pub yes_votes: Option<usize>,
    pub eligible_voters: Option<usize>,
    pub new_owner_id: Option<Uuid>,
    /// `false` when the owner changed but the vote reset failed; it heals on the next vote.
    pub votes_cleared: Option<bool>,
}
