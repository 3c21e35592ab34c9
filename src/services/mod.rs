pub mod change_events;
pub mod chat_service;
pub mod documentation;
pub mod feed_service;
pub mod health_service;
pub mod membership_service;
pub mod ownership_service;
pub mod playback_service;
pub mod presence_service;
pub mod queue_service;
pub mod session_service;
pub mod sse_service;
pub mod storage_supervisor;
