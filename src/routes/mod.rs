use axum::Router;

use crate::state::SharedState;

pub mod chat;
pub mod docs;
pub mod health;
pub mod playback;
pub mod presence;
pub mod queue;
pub mod sessions;
pub mod sse;
pub mod votes;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(presence::router())
        .merge(sessions::router())
        .merge(votes::router())
        .merge(queue::router())
        .merge(playback::router())
        .merge(chat::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
