//! Per-client WebSocket session state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use visor_core::Capability;

/// A connected rendering client.
///
/// Created at upgrade time with the configured default capability; the
/// handshake may replace it with the client's declared version. The session
/// stays unattached (invisible to broadcasts) until its replay is queued.
pub struct ClientSession {
    /// Unique session ID.
    pub id: String,
    /// Send channel to the session's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this session was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// Set once the replay sequence has been queued; broadcasts skip
    /// unattached sessions.
    attached: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full channel.
    pub dropped_messages: AtomicU64,
    /// Negotiated protocol capability.
    capability: Mutex<Capability>,
    /// Cancelled to force this session off (overflow, heartbeat timeout,
    /// server shutdown).
    cancel: CancellationToken,
}

impl ClientSession {
    /// Create a new session.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>, capability: Capability) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            attached: AtomicBool::new(false),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            capability: Mutex::new(capability),
            cancel: CancellationToken::new(),
        }
    }

    /// Enqueue a text message for delivery.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this session.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the session as caught up; broadcasts now reach it.
    pub fn attach(&self) {
        self.attached.store(true, Ordering::Release);
    }

    /// Whether the session receives live broadcasts.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Record the handshake-negotiated capability.
    pub fn set_capability(&self, capability: Capability) {
        *self.capability.lock() = capability;
    }

    /// The negotiated capability.
    pub fn capability(&self) -> Capability {
        *self.capability.lock()
    }

    /// Mark the session as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or session establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the session was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Force this session off; its tasks observe the token and unwind.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Whether a disconnect has been requested.
    pub fn is_disconnecting(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the session's tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Session age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> (ClientSession, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let session = ClientSession::new("gui_1".into(), tx, Capability::new(1));
        (session, rx)
    }

    #[test]
    fn create_session() {
        let (session, _rx) = make_session();
        assert_eq!(session.id, "gui_1");
        assert!(!session.is_attached());
        assert!(session.is_alive.load(Ordering::Relaxed));
        assert_eq!(session.capability(), Capability::new(1));
    }

    #[tokio::test]
    async fn send_message_success() {
        let (session, mut rx) = make_session();
        let sent = session.send(Arc::new("hello".into()));
        assert!(sent);
        let msg = rx.recv().await.unwrap();
        assert_eq!(&**msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (tx, rx) = mpsc::channel(32);
        let session = ClientSession::new("gui_2".into(), tx, Capability::new(1));
        drop(rx);
        assert!(!session.send(Arc::new("hello".into())));
        assert_eq!(session.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let session = ClientSession::new("gui_3".into(), tx, Capability::new(1));
        assert!(session.send(Arc::new("msg1".into())));
        // Channel is now full
        assert!(!session.send(Arc::new("msg2".into())));
        assert_eq!(session.drop_count(), 1);
    }

    #[test]
    fn attach_flips_visibility() {
        let (session, _rx) = make_session();
        assert!(!session.is_attached());
        session.attach();
        assert!(session.is_attached());
    }

    #[test]
    fn capability_updated_by_handshake() {
        let (session, _rx) = make_session();
        session.set_capability(Capability::new(3));
        assert_eq!(session.capability(), Capability::new(3));
    }

    #[test]
    fn mark_alive_and_check() {
        let (session, _rx) = make_session();
        // Initially alive
        assert!(session.check_alive());
        // After check, no longer alive
        assert!(!session.check_alive());
        session.mark_alive();
        assert!(session.check_alive());
    }

    #[test]
    fn disconnect_cancels_token() {
        let (session, _rx) = make_session();
        let token = session.cancel_token();
        assert!(!session.is_disconnecting());
        session.disconnect();
        assert!(session.is_disconnecting());
        assert!(token.is_cancelled());
    }

    #[test]
    fn session_age_increases() {
        let (session, _rx) = make_session();
        let age1 = session.age();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let age2 = session.age();
        assert!(age2 > age1);
    }

    #[tokio::test]
    async fn send_multiple_messages_in_order() {
        let (session, mut rx) = make_session();
        for i in 0..5 {
            assert!(session.send(Arc::new(format!("msg_{i}"))));
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(&**msg, &format!("msg_{i}"));
        }
    }
}
