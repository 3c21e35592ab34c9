use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::ChatMessageEntity,
    dto::{format_system_time, validation::validate_chat_message},
};

/// Chat message posted by a participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SendChatRequest {
    pub participant_id: Uuid,
    #[validate(custom(function = "validate_chat_message"))]
    pub message: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ChatMessageSummary {
    pub id: Uuid,
    pub session_id: Uuid,
    pub participant_id: Uuid,
    pub message: String,
    pub created_at: String,
}

impl From<ChatMessageEntity> for ChatMessageSummary {
    fn from(message: ChatMessageEntity) -> Self {
        Self {
            id: message.id,
            session_id: message.session_id,
            participant_id: message.participant_id,
            message: message.message,
            created_at: format_system_time(message.created_at),
        }
    }
}
