use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from presence WebSocket clients.
#[serde(tag = "type")]
pub enum PresenceInboundMessage {
    /// Must be the first frame; binds the connection to a participant.
    #[serde(rename = "track")]
    Track { participant_id: Uuid },
    #[serde(other)]
    Unknown,
}

impl PresenceInboundMessage {
    pub fn tracked_participant(&self) -> Option<Uuid> {
        match self {
            Self::Track { participant_id } => Some(*participant_id),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to presence WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceOutboundMessage {
    /// Acknowledges a `track` frame with the participants currently present.
    Tracked {
        participant_id: Uuid,
        present: Vec<Uuid>,
    },
    Error {
        message: String,
    },
}
