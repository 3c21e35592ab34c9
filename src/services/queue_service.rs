use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::QueueItemEntity,
    error::ServiceError,
    services::{
        change_events,
        session_service::{load_session, require_participant},
    },
    state::{SharedState, video::VideoId},
};

/// Append a video to the session queue.
///
/// `video` may be a raw identifier or a supported URL; it is parsed before any store access.
pub async fn enqueue(
    state: &SharedState,
    session_id: Uuid,
    added_by: Uuid,
    video: &str,
) -> Result<QueueItemEntity, ServiceError> {
    let video_id =
        VideoId::parse(video).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let store = state.require_session_store().await?;
    load_session(&store, session_id).await?;
    require_participant(&store, session_id, added_by).await?;

    let item = QueueItemEntity {
        id: Uuid::now_v7(),
        session_id,
        thumbnail_url: Some(video_id.thumbnail_url()),
        video_id: video_id.into_string(),
        title: None,
        added_by,
        played: false,
        created_at: SystemTime::now(),
    };
    store.insert_queue_item(item.clone()).await?;
    change_events::queue_item_inserted(state, &item);

    info!(
        session_id = %session_id,
        item_id = %item.id,
        video_id = %item.video_id,
        "video queued"
    );
    Ok(item)
}

/// Delete an unplayed item. Removing an item that is already gone succeeds with `false`.
pub async fn remove(
    state: &SharedState,
    session_id: Uuid,
    item_id: Uuid,
) -> Result<bool, ServiceError> {
    let store = state.require_session_store().await?;
    let removed = store.delete_queue_item(session_id, item_id).await?;
    if removed {
        change_events::queue_item_deleted(state, session_id, item_id);
    }
    Ok(removed)
}

/// Unplayed items in FIFO order.
pub async fn list(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<QueueItemEntity>, ServiceError> {
    let store = state.require_session_store().await?;
    load_session(&store, session_id).await?;
    Ok(store.list_unplayed_queue(session_id).await?)
}
