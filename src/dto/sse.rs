use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    pub session_id: Uuid,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
            ChangeOperation::Upsert => "upsert",
        }
    }
}

#[derive(Debug, Serialize)]
/// Row change pushed on the per-session change feed, named `<table>.<operation>`.
pub struct ChangeEvent<'a, T: Serialize> {
    pub table: &'static str,
    pub operation: ChangeOperation,
    pub row: &'a T,
}

#[derive(Debug, Serialize, ToSchema)]
/// Row of a `votes.delete` event: every vote of the session went away.
pub struct VotesCleared {
    pub session_id: Uuid,
    pub deleted: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Row of a `queue_items.delete` event.
pub struct QueueItemRemoved {
    pub id: Uuid,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// Row of `presence.join` and `presence.leave` events.
pub struct PresenceChange {
    pub participant_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// Row of a `presence.sync` event.
pub struct PresenceSync {
    pub present: Vec<Uuid>,
}
