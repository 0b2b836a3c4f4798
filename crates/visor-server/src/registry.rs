//! Connection registry and broadcast fan-out.
//!
//! Implements the dispatcher's [`Fanout`] seam: serialize once, then push the
//! shared string into every attached session's bounded queue with a
//! non-blocking `try_send`. A full queue forces that client off instead of
//! stalling everyone else's delivery.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::RwLock;
use tracing::{debug, warn};
use visor_core::GuiMessage;
use visor_state::Fanout;

use crate::metrics::{
    GUI_CONNECTIONS, GUI_CONNECTIONS_TOTAL, GUI_DISCONNECTIONS_TOTAL, GUI_MESSAGES_DROPPED_TOTAL,
};
use crate::websocket::connection::ClientSession;

/// Connected rendering clients indexed by session ID.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, Arc<ClientSession>>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a registry that admits at most `max_connections` clients.
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Admit a session. Returns `false` when the registry is at capacity.
    pub fn register(&self, session: Arc<ClientSession>) -> bool {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_connections && !sessions.contains_key(&session.id) {
            warn!(
                session_id = %session.id,
                max = self.max_connections,
                "connection limit reached, refusing client"
            );
            return false;
        }
        let _ = sessions.insert(session.id.clone(), session);
        counter!(GUI_CONNECTIONS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!(GUI_CONNECTIONS).set(sessions.len() as f64);
        true
    }

    /// Remove a session. Removing an unknown ID is a no-op.
    pub fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if sessions.remove(session_id).is_some() {
            counter!(GUI_DISCONNECTIONS_TOTAL).increment(1);
            #[allow(clippy::cast_precision_loss)]
            gauge!(GUI_CONNECTIONS).set(sessions.len() as f64);
        }
    }

    /// Look up a session by ID.
    pub fn get(&self, session_id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Number of registered sessions (attached or not).
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Trip every session's cancel token so their tasks send a Close frame
    /// and unwind. Returns how many sessions were told to go.
    pub fn disconnect_all(&self) -> usize {
        let sessions = self.sessions.read();
        for session in sessions.values() {
            session.disconnect();
        }
        sessions.len()
    }

    fn serialize(message: &GuiMessage) -> Option<Arc<String>> {
        match serde_json::to_string(message) {
            Ok(json) => Some(Arc::new(json)),
            Err(e) => {
                warn!(message_type = message.message_type(), error = %e, "failed to serialize message");
                None
            }
        }
    }
}

impl Fanout for ConnectionRegistry {
    /// Fan a message out to every attached session.
    ///
    /// Called with the dispatcher's writer lock held, so it must never block:
    /// a session whose queue is full gets its cancel token tripped and its
    /// own task unwinds and unregisters it.
    fn broadcast(&self, message: &GuiMessage) {
        let Some(json) = Self::serialize(message) else {
            return;
        };
        let sessions = self.sessions.read();
        for session in sessions.values() {
            if !session.is_attached() || session.is_disconnecting() {
                continue;
            }
            if !session.send(json.clone()) {
                counter!(GUI_MESSAGES_DROPPED_TOTAL).increment(1);
                warn!(
                    session_id = %session.id,
                    dropped = session.drop_count(),
                    "outbound queue overflow, forcing client off"
                );
                session.disconnect();
            }
        }
    }

    /// Queue a replay sequence to one not-yet-attached session.
    fn queue_replay(&self, session_id: &str, messages: &[GuiMessage]) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };
        for message in messages {
            let Some(json) = Self::serialize(message) else {
                return false;
            };
            if !session.send(json) {
                counter!(GUI_MESSAGES_DROPPED_TOTAL).increment(1);
                warn!(
                    session_id = %session_id,
                    "queue overflow during replay, forcing client off"
                );
                session.disconnect();
                return false;
            }
        }
        true
    }

    /// Attach a session to live broadcast traffic.
    fn attach(&self, session_id: &str) {
        if let Some(session) = self.get(session_id) {
            session.attach();
            debug!(session_id = %session_id, "session attached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use visor_core::Capability;

    fn make_session(id: &str, queue: usize) -> (Arc<ClientSession>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(queue);
        let session = Arc::new(ClientSession::new(id.into(), tx, Capability::new(1)));
        (session, rx)
    }

    fn insert_msg(namespace: &str) -> GuiMessage {
        GuiMessage::NamespaceInsert {
            namespace: namespace.into(),
            position: 0,
        }
    }

    #[test]
    fn register_and_count() {
        let registry = ConnectionRegistry::new(10);
        let (s1, _rx1) = make_session("a", 8);
        assert!(registry.register(s1));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn register_refuses_over_capacity() {
        let registry = ConnectionRegistry::new(1);
        let (s1, _rx1) = make_session("a", 8);
        let (s2, _rx2) = make_session("b", 8);
        assert!(registry.register(s1));
        assert!(!registry.register(s2));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = ConnectionRegistry::new(10);
        registry.unregister("ghost");
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_only_attached_sessions() {
        let registry = ConnectionRegistry::new(10);
        let (attached, mut rx_a) = make_session("a", 8);
        let (fresh, mut rx_b) = make_session("b", 8);
        assert!(registry.register(attached.clone()));
        assert!(registry.register(fresh));
        attached.attach();

        registry.broadcast(&insert_msg("weather"));

        let msg = rx_a.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "namespace-insert");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_serializes_once() {
        let registry = ConnectionRegistry::new(10);
        let (s1, mut rx1) = make_session("a", 8);
        let (s2, mut rx2) = make_session("b", 8);
        s1.attach();
        s2.attach();
        assert!(registry.register(s1));
        assert!(registry.register(s2));

        registry.broadcast(&insert_msg("clock"));

        let m1 = rx1.try_recv().unwrap();
        let m2 = rx2.try_recv().unwrap();
        // both receivers hold the same allocation
        assert!(Arc::ptr_eq(&m1, &m2));
    }

    #[tokio::test]
    async fn overflowing_session_is_forced_off() {
        let registry = ConnectionRegistry::new(10);
        let (slow, _rx) = make_session("slow", 1);
        slow.attach();
        assert!(registry.register(slow.clone()));

        registry.broadcast(&insert_msg("one"));
        // queue of 1 is now full; the next broadcast overflows
        registry.broadcast(&insert_msg("two"));

        assert!(slow.is_disconnecting());
        assert_eq!(slow.drop_count(), 1);
    }

    #[tokio::test]
    async fn disconnecting_session_is_skipped() {
        let registry = ConnectionRegistry::new(10);
        let (session, mut rx) = make_session("a", 8);
        session.attach();
        session.disconnect();
        assert!(registry.register(session));

        registry.broadcast(&insert_msg("weather"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn queue_replay_delivers_in_order_without_attaching() {
        let registry = ConnectionRegistry::new(10);
        let (session, mut rx) = make_session("late", 8);
        assert!(registry.register(session.clone()));

        let messages = vec![
            insert_msg("weather"),
            GuiMessage::ValueSet {
                namespace: "weather".into(),
                key: "temp".into(),
                value: json!(21),
            },
        ];
        assert!(registry.queue_replay("late", &messages));
        assert!(!session.is_attached());

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "namespace-insert");
        assert_eq!(second["type"], "value-set");
    }

    #[test]
    fn queue_replay_to_unknown_session_fails() {
        let registry = ConnectionRegistry::new(10);
        assert!(!registry.queue_replay("ghost", &[insert_msg("weather")]));
    }

    #[tokio::test]
    async fn queue_replay_overflow_forces_off_and_fails() {
        let registry = ConnectionRegistry::new(10);
        let (session, _rx) = make_session("tiny", 1);
        assert!(registry.register(session.clone()));

        let messages = vec![insert_msg("a"), insert_msg("b")];
        assert!(!registry.queue_replay("tiny", &messages));
        assert!(session.is_disconnecting());
    }

    #[tokio::test]
    async fn disconnect_all_trips_every_session() {
        let registry = ConnectionRegistry::new(10);
        let (s1, _rx1) = make_session("a", 8);
        let (s2, _rx2) = make_session("b", 8);
        assert!(registry.register(s1.clone()));
        assert!(registry.register(s2.clone()));

        assert_eq!(registry.disconnect_all(), 2);
        assert!(s1.is_disconnecting());
        assert!(s2.is_disconnecting());
        // sessions unregister themselves as their tasks unwind
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn attach_marks_session() {
        let registry = ConnectionRegistry::new(10);
        let (session, _rx) = make_session("a", 8);
        assert!(registry.register(session.clone()));
        registry.attach("a");
        assert!(session.is_attached());
        // unknown IDs are ignored
        registry.attach("ghost");
    }
}
