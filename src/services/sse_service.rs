use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::session_service::load_session,
    state::SharedState,
};

/// Open the change feed of one session.
///
/// The handshake is the first event; row changes follow in broadcast order. Lagging
/// clients skip the events they missed.
pub async fn open_stream(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let store = state.require_session_store().await?;
    load_session(&store, session_id).await?;

    let mut receiver = state.changes().subscribe(session_id);
    let handshake = ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            session_id,
            message: "subscribed to session changes".into(),
            degraded: state.is_degraded().await,
        },
    );

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let forwarder_state = state.clone();

    tokio::spawn(async move {
        match handshake {
            Ok(payload) => {
                if tx.send(Ok(to_event(payload))).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize SSE handshake"),
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(session_id = %session_id, skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        drop(receiver);
        forwarder_state.changes().prune(session_id);
        info!(session_id = %session_id, "session SSE stream disconnected");
    });

    info!(session_id = %session_id, "new session SSE connection");

    let stream = ReceiverStream::new(rx);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}
