use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Watch Party Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::get_session,
        crate::routes::votes::cast_vote,
        crate::routes::queue::list_queue,
        crate::routes::queue::enqueue,
        crate::routes::queue::remove_item,
        crate::routes::playback::advance,
        crate::routes::chat::history,
        crate::routes::chat::send_message,
        crate::routes::sse::session_events,
        crate::routes::presence::presence_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::SessionSummary,
            crate::dto::session::ParticipantSummary,
            crate::dto::session::FeedSummary,
            crate::dto::session::SessionJoinedResponse,
            crate::dto::session::SessionSnapshot,
            crate::dto::vote::CastVoteRequest,
            crate::dto::vote::VoteSummary,
            crate::dto::vote::VoteResult,
            crate::dto::vote::VoteResponse,
            crate::dto::queue::EnqueueRequest,
            crate::dto::queue::QueueItemSummary,
            crate::dto::queue::RemoveQueueItemResponse,
            crate::dto::playback::AdvanceRequest,
            crate::dto::playback::AdvanceResponse,
            crate::dto::chat::SendChatRequest,
            crate::dto::chat::ChatMessageSummary,
            crate::dto::ws::PresenceInboundMessage,
            crate::dto::ws::PresenceOutboundMessage,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ChangeOperation,
            crate::dto::sse::VotesCleared,
            crate::dto::sse::QueueItemRemoved,
            crate::dto::sse::PresenceChange,
            crate::dto::sse::PresenceSync,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle"),
        (name = "votes", description = "Feed handover votes"),
        (name = "queue", description = "Explicit play queue"),
        (name = "playback", description = "Playback advancement"),
        (name = "chat", description = "Session chat"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "presence", description = "WebSocket presence tracking"),
    )
)]
pub struct ApiDoc;
