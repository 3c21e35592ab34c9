use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{FeedEntity, ParticipantEntity, PlaybackSource, SessionEntity},
    dto::{
        format_system_time,
        queue::QueueItemSummary,
        validation::{validate_display_name, validate_join_code, validate_vote_threshold},
        vote::VoteSummary,
    },
};

/// Payload used to open a new watch party.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub display_name: String,
    /// Fraction of eligible voters needed to switch feeds. Defaults to the configured value.
    #[serde(default)]
    pub vote_threshold: Option<f64>,
}

impl Validate for CreateSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_display_name(&self.display_name) {
            errors.add("display_name", e);
        }

        if let Some(threshold) = self.vote_threshold {
            if let Err(e) = validate_vote_threshold(threshold) {
                errors.add("vote_threshold", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload used to join an existing watch party by its code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    #[validate(custom(function = "validate_join_code"))]
    pub join_code: String,
    #[validate(custom(function = "validate_display_name"))]
    pub display_name: String,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, ToSchema)]
/// Public projection of a session row.
pub struct SessionSummary {
    pub id: Uuid,
    pub join_code: String,
    pub host_id: Option<Uuid>,
    pub current_feed_owner_id: Option<Uuid>,
    pub current_video_id: Option<String>,
    pub current_queue_item_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub current_source: PlaybackSource,
    pub playback_started_at: Option<String>,
    pub vote_threshold: f64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SessionEntity> for SessionSummary {
    fn from(session: SessionEntity) -> Self {
        Self {
            id: session.id,
            join_code: session.join_code,
            host_id: session.host_id,
            current_feed_owner_id: session.current_feed_owner_id,
            current_video_id: session.current_video_id,
            current_queue_item_id: session.current_queue_item_id,
            current_source: session.current_source,
            playback_started_at: session.playback_started_at.map(format_system_time),
            vote_threshold: session.vote_threshold,
            is_active: session.is_active,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Public projection of a participant.
pub struct ParticipantSummary {
    pub id: Uuid,
    pub session_id: Uuid,
    pub display_name: String,
    pub is_host: bool,
    pub is_connected: bool,
    pub last_seen_at: String,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(participant: ParticipantEntity) -> Self {
        Self {
            id: participant.id,
            session_id: participant.session_id,
            display_name: participant.display_name,
            is_host: participant.is_host,
            is_connected: participant.is_connected,
            last_seen_at: format_system_time(participant.last_seen_at),
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, ToSchema)]
/// Feed position without the candidate list itself.
pub struct FeedSummary {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub pointer_index: usize,
    pub length: usize,
    /// Video the next feed advance would play.
    pub next_video_id: Option<String>,
}

impl From<&FeedEntity> for FeedSummary {
    fn from(feed: &FeedEntity) -> Self {
        Self {
            session_id: feed.session_id,
            user_id: feed.user_id,
            pointer_index: feed.pointer_index,
            length: feed.items.len(),
            next_video_id: feed.next_item().map(|item| item.video_id.clone()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Returned after creating or joining a session.
pub struct SessionJoinedResponse {
    pub session: SessionSummary,
    /// Participant created for the caller; its id identifies the caller in later requests.
    pub participant: ParticipantSummary,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
/// Everything a client needs to render a session.
pub struct SessionSnapshot {
    pub session: SessionSummary,
    pub participants: Vec<ParticipantSummary>,
    pub queue: Vec<QueueItemSummary>,
    pub votes: Vec<VoteSummary>,
    pub owner_feed: Option<FeedSummary>,
}
