use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// Per-session broadcast hubs carrying row change events.
///
/// Delivery is best effort: a subscriber that lags behind skips events, and publishing to
/// a session without subscribers drops the event.
pub struct ChangeHub {
    capacity: usize,
    sessions: DashMap<Uuid, broadcast::Sender<ServerEvent>>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: DashMap::new(),
        }
    }

    /// Register a new subscriber that will receive subsequent events of `session_id`.
    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.sessions
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send an event to the current subscribers of `session_id`.
    pub fn publish(&self, session_id: Uuid, event: ServerEvent) {
        if let Some(sender) = self.sessions.get(&session_id) {
            let _ = sender.send(event);
        }
    }

    /// Send an event to every session with subscribers.
    pub fn publish_all(&self, event: ServerEvent) {
        for sender in self.sessions.iter() {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop the hub of `session_id` once its last subscriber is gone.
    pub fn prune(&self, session_id: Uuid) {
        self.sessions
            .remove_if(&session_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> ServerEvent {
        ServerEvent {
            event: Some(name.to_owned()),
            data: "{}".into(),
        }
    }

    #[tokio::test]
    async fn events_stay_within_their_session() {
        let hub = ChangeHub::new(8);
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let mut first_rx = hub.subscribe(first);
        let mut second_rx = hub.subscribe(second);

        hub.publish(first, event("votes.upsert"));

        assert_eq!(
            first_rx.recv().await.unwrap().event.as_deref(),
            Some("votes.upsert")
        );
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn prune_keeps_hubs_with_live_subscribers() {
        let hub = ChangeHub::new(8);
        let session = Uuid::new_v4();
        let receiver = hub.subscribe(session);

        hub.prune(session);
        assert_eq!(hub.session_count(), 1);

        drop(receiver);
        hub.prune(session);
        assert_eq!(hub.session_count(), 0);
    }
}
