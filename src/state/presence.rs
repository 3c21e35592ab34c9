use dashmap::DashMap;
use indexmap::IndexMap;
use uuid::Uuid;

/// Presence notification derived from connection bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Full set of participants with at least one live connection.
    Sync(Vec<Uuid>),
    Join(Uuid),
    Leave(Uuid),
}

/// Live presence connections per session.
///
/// A participant may hold several connections (tabs, reconnects); it joins on its first
/// connection and leaves when the last one goes away.
#[derive(Default)]
pub struct PresenceRegistry {
    sessions: DashMap<Uuid, IndexMap<Uuid, usize>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `[Join, Sync]` for a first connection, `[Sync]` otherwise.
    pub fn track(&self, session_id: Uuid, participant_id: Uuid) -> Vec<PresenceEvent> {
        let mut connections = self.sessions.entry(session_id).or_default();
        let count = connections.entry(participant_id).or_insert(0);
        *count += 1;
        let first = *count == 1;
        let present = connections.keys().copied().collect();
        drop(connections);

        let mut events = Vec::with_capacity(2);
        if first {
            events.push(PresenceEvent::Join(participant_id));
        }
        events.push(PresenceEvent::Sync(present));
        events
    }

    /// Release a connection. Returns `[Sync, Leave]` when it was the participant's last one.
    pub fn untrack(&self, session_id: Uuid, participant_id: Uuid) -> Vec<PresenceEvent> {
        let Some(mut connections) = self.sessions.get_mut(&session_id) else {
            return Vec::new();
        };
        let Some(count) = connections.get_mut(&participant_id) else {
            return Vec::new();
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return Vec::new();
        }

        connections.shift_remove(&participant_id);
        let present = connections.keys().copied().collect();
        let empty = connections.is_empty();
        drop(connections);

        if empty {
            self.sessions
                .remove_if(&session_id, |_, connections| connections.is_empty());
        }

        vec![
            PresenceEvent::Sync(present),
            PresenceEvent::Leave(participant_id),
        ]
    }

    /// Participants currently present in `session_id`, in arrival order.
    pub fn present(&self, session_id: Uuid) -> Vec<Uuid> {
        self.sessions
            .get(&session_id)
            .map(|connections| connections.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_connections_count_once() {
        let registry = PresenceRegistry::new();
        let (session, alice) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(
            registry.track(session, alice),
            vec![
                PresenceEvent::Join(alice),
                PresenceEvent::Sync(vec![alice])
            ]
        );
        assert_eq!(
            registry.track(session, alice),
            vec![PresenceEvent::Sync(vec![alice])]
        );

        assert!(registry.untrack(session, alice).is_empty());
        assert_eq!(
            registry.untrack(session, alice),
            vec![PresenceEvent::Sync(vec![]), PresenceEvent::Leave(alice)]
        );
        assert!(registry.present(session).is_empty());
    }

    #[test]
    fn untracking_an_unknown_participant_is_silent() {
        let registry = PresenceRegistry::new();
        let session = Uuid::new_v4();
        registry.track(session, Uuid::new_v4());

        assert!(registry.untrack(session, Uuid::new_v4()).is_empty());
        assert!(registry.untrack(Uuid::new_v4(), Uuid::new_v4()).is_empty());
    }

    #[test]
    fn sync_lists_everyone_still_present() {
        let registry = PresenceRegistry::new();
        let (session, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        registry.track(session, alice);
        registry.track(session, bob);

        assert_eq!(
            registry.untrack(session, alice),
            vec![PresenceEvent::Sync(vec![bob]), PresenceEvent::Leave(alice)]
        );
        assert_eq!(registry.present(session), vec![bob]);
    }
}
