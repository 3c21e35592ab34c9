use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::PlaybackSource;

/// Request to move playback to the next video. Only the feed owner may advance.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AdvanceRequest {
    pub participant_id: Uuid,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
/// Video selected by an advance.
pub struct AdvanceResponse {
    pub video_id: String,
    #[schema(value_type = String)]
    pub source: PlaybackSource,
    pub queue_item_id: Option<Uuid>,
    /// Feed position after the advance, when the video came from the feed.
    pub feed_pointer_index: Option<usize>,
    pub playback_started_at: String,
}
