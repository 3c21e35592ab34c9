use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::QueueItemEntity, dto::format_system_time};

/// Request adding a video to the session queue.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EnqueueRequest {
    pub participant_id: Uuid,
    /// Raw 11 character id, or a `shorts/`, `watch?v=` or `youtu.be/` URL.
    #[validate(length(min = 1, max = 2048))]
    pub video: String,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, ToSchema)]
/// Public projection of a queue item.
pub struct QueueItemSummary {
    pub id: Uuid,
    pub session_id: Uuid,
    pub video_id: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub added_by: Uuid,
    pub played: bool,
    pub created_at: String,
}

impl From<QueueItemEntity> for QueueItemSummary {
    fn from(item: QueueItemEntity) -> Self {
        Self {
            id: item.id,
            session_id: item.session_id,
            video_id: item.video_id,
            title: item.title,
            thumbnail_url: item.thumbnail_url,
            added_by: item.added_by,
            played: item.played,
            created_at: format_system_time(item.created_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of a queue removal; removing a missing item is not an error.
pub struct RemoveQueueItemResponse {
    pub removed: bool,
}
