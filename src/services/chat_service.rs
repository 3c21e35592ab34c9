use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::ChatMessageEntity,
    dto::validation::validate_chat_message,
    error::ServiceError,
    services::{
        change_events,
        session_service::{load_session, require_participant},
    },
    state::SharedState,
};

/// Post a chat message as `participant_id`.
pub async fn send(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
    message: &str,
) -> Result<ChatMessageEntity, ServiceError> {
    validate_chat_message(message)?;

    let store = state.require_session_store().await?;
    require_participant(&store, session_id, participant_id).await?;

    let row = ChatMessageEntity {
        id: Uuid::now_v7(),
        session_id,
        participant_id,
        message: message.trim().to_string(),
        created_at: SystemTime::now(),
    };
    store.insert_chat_message(row.clone()).await?;
    change_events::chat_message_inserted(state, &row);
    Ok(row)
}

/// Messages of the session, oldest first.
pub async fn history(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<ChatMessageEntity>, ServiceError> {
    let store = state.require_session_store().await?;
    load_session(&store, session_id).await?;
    Ok(store.list_chat_messages(session_id).await?)
}
