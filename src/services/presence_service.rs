use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{PresenceInboundMessage, PresenceOutboundMessage},
    error::ServiceError,
    services::{
        membership_service,
        session_service::{load_session, require_participant},
    },
    state::SharedState,
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live presence registration of one connection.
///
/// Dropping the lease without calling [`PresenceLease::release`] still untracks the
/// connection and applies the resulting events on a background task.
pub struct PresenceLease {
    state: SharedState,
    session_id: Uuid,
    participant_id: Uuid,
    released: bool,
}

impl PresenceLease {
    /// Untrack the connection and wait for the resulting presence events to be applied.
    pub async fn release(mut self) {
        self.released = true;
        let events = self
            .state
            .presence()
            .untrack(self.session_id, self.participant_id);
        membership_service::apply_presence_events(&self.state, self.session_id, events).await;
    }
}

impl Drop for PresenceLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let events = self
            .state
            .presence()
            .untrack(self.session_id, self.participant_id);
        if events.is_empty() {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let state = self.state.clone();
                let session_id = self.session_id;
                handle.spawn(async move {
                    membership_service::apply_presence_events(&state, session_id, events).await;
                });
            }
            Err(_) => warn!(
                session_id = %self.session_id,
                participant_id = %self.participant_id,
                "presence lease dropped outside a runtime; leave not applied"
            ),
        }
    }
}

/// Register a connection for `participant_id` and apply the join and sync it produces.
pub async fn track_participant(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<PresenceLease, ServiceError> {
    let store = state.require_session_store().await?;
    load_session(&store, session_id).await?;
    require_participant(&store, session_id, participant_id).await?;

    let events = state.presence().track(session_id, participant_id);
    let lease = PresenceLease {
        state: state.clone(),
        session_id,
        participant_id,
        released: false,
    };
    membership_service::apply_presence_events(state, session_id, events).await;
    Ok(lease)
}

/// Handle the full lifecycle of one presence WebSocket connection.
pub async fn handle_socket(state: SharedState, session_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "presence websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(session_id = %session_id, "presence tracking timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let participant_id = match serde_json::from_str::<PresenceInboundMessage>(&initial_message)
        .ok()
        .and_then(|message| message.tracked_participant())
    {
        Some(participant_id) => participant_id,
        None => {
            warn!(session_id = %session_id, "first presence frame was not a track message");
            send_outbound(
                &outbound_tx,
                &PresenceOutboundMessage::Error {
                    message: "first frame must be a track message".into(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let lease = match track_participant(&state, session_id, participant_id).await {
        Ok(lease) => lease,
        Err(err) => {
            warn!(session_id = %session_id, participant_id = %participant_id, error = %err, "presence tracking rejected");
            send_outbound(
                &outbound_tx,
                &PresenceOutboundMessage::Error {
                    message: err.to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    info!(session_id = %session_id, participant_id = %participant_id, "presence connected");
    send_outbound(
        &outbound_tx,
        &PresenceOutboundMessage::Tracked {
            participant_id,
            present: state.presence().present(session_id),
        },
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Ok(PresenceInboundMessage::Track { .. }) =
                    serde_json::from_str::<PresenceInboundMessage>(&text)
                {
                    warn!(participant_id = %participant_id, "ignoring duplicate track message");
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(participant_id = %participant_id, error = %err, "presence websocket error");
                break;
            }
        }
    }

    lease.release().await;
    info!(session_id = %session_id, participant_id = %participant_id, "presence disconnected");

    finalize(writer_task, outbound_tx).await;
}

fn send_outbound(outbound_tx: &mpsc::UnboundedSender<Message>, message: &PresenceOutboundMessage) {
    match serde_json::to_string(message) {
        Ok(text) => {
            let _ = outbound_tx.send(Message::Text(text.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize presence message"),
    }
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
