//! The single-writer mutation path.
//!
//! Every state change — skill calls, expiry timers, validated client events —
//! funnels through the [`Dispatcher`]. It holds the only lock on the
//! [`StateModel`]; each public operation takes that lock for its full
//! mutate-then-broadcast step, which is what gives every connected session
//! the same total order of messages, and what makes a new session's
//! snapshot-and-attach atomic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use visor_core::{GuiMessage, ProtocolError};
use visor_settings::VisorSettings;

use crate::extensions::GuiExtension;
use crate::model::{Lifetime, StateModel, StateSnapshot};
use crate::replay::replay_sequence;

/// Outbound event name announcing a new foreground namespace.
pub const NAMESPACE_DISPLAYED: &str = "namespace.displayed";

/// Inbound event: a page took focus on the client.
pub const PAGE_GAINED_FOCUS: &str = "page-gained-focus";

/// Inbound event: the user interacted with the foreground surface.
pub const PAGE_INTERACTION: &str = "page-interaction";

/// Inbound event: back navigation to the previous page of the foreground
/// namespace.
pub const GLOBAL_BACK: &str = "global-back";

/// Outbound delivery seam, implemented by the connection registry.
///
/// All methods are synchronous and non-blocking: delivery happens through
/// bounded per-session queues, so the dispatcher can call them while holding
/// its writer lock without ever suspending on a slow peer.
pub trait Fanout: Send + Sync {
    /// Fan a message out to every attached session.
    fn broadcast(&self, message: &GuiMessage);

    /// Queue a replay sequence to one (not yet attached) session.
    /// Returns false if the session is unknown.
    fn queue_replay(&self, session_id: &str, messages: &[GuiMessage]) -> bool;

    /// Attach a session to live broadcast traffic.
    fn attach(&self, session_id: &str);
}

/// The single serialization point for all GUI state mutations.
pub struct Dispatcher {
    state: Mutex<StateModel>,
    fanout: Arc<dyn Fanout>,
    extension: Arc<dyn GuiExtension>,
    default_lifetime: Lifetime,
    expiry_timers: Mutex<HashMap<String, CancellationToken>>,
}

impl Dispatcher {
    /// Build a dispatcher over an empty stack.
    pub fn new(
        settings: &VisorSettings,
        extension: Arc<dyn GuiExtension>,
        fanout: Arc<dyn Fanout>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StateModel::new(settings.extension.pinned_precedence)),
            fanout,
            extension,
            default_lifetime: Lifetime::Seconds(settings.lifetime.default_secs),
            expiry_timers: Mutex::new(HashMap::new()),
        })
    }

    // ── Mutation operations ─────────────────────────────────────────

    /// Insert or raise a namespace. `lifetime` applies only on creation.
    pub fn upsert_namespace(self: &Arc<Self>, name: &str, lifetime: Option<Lifetime>) {
        let lifetime = lifetime.unwrap_or(self.default_lifetime);
        {
            let mut state = self.state.lock();
            let prev_top = state.top_name().map(str::to_owned);
            let messages = state.upsert_namespace(name, lifetime);
            self.publish(&state, prev_top.as_deref(), &messages);
        }
        self.reschedule_expiry(name);
    }

    /// Raise an existing namespace to the foreground.
    pub fn move_to_top(self: &Arc<Self>, name: &str) {
        {
            let mut state = self.state.lock();
            if state.get(name).is_none() {
                warn!(namespace = %name, "move_to_top of unknown namespace, dropped");
                return;
            }
            let prev_top = state.top_name().map(str::to_owned);
            let messages = state.move_to_top(name);
            self.publish(&state, prev_top.as_deref(), &messages);
        }
        self.reschedule_expiry(name);
    }

    /// Remove a namespace. Removing an absent one is a no-op.
    pub fn remove_namespace(self: &Arc<Self>, name: &str) {
        {
            let mut state = self.state.lock();
            let prev_top = state.top_name().map(str::to_owned);
            let mut messages = state.remove_namespace(name);
            if messages.is_empty() {
                debug!(namespace = %name, "remove of absent namespace, no-op");
                return;
            }
            messages.extend(self.restore_homescreen(&mut state));
            self.publish(&state, prev_top.as_deref(), &messages);
        }
        self.cancel_expiry(name);
    }

    /// Insert a page, creating (and activating) the namespace if absent.
    pub fn insert_page(self: &Arc<Self>, namespace: &str, page: &str, index: Option<usize>) {
        {
            let mut state = self.state.lock();
            let prev_top = state.top_name().map(str::to_owned);
            let messages = state.insert_page(namespace, page, index, self.default_lifetime);
            self.publish(&state, prev_top.as_deref(), &messages);
        }
        self.reschedule_expiry(namespace);
    }

    /// Remove a page; an unpinned namespace emptied by this removal leaves
    /// the stack in the same step.
    pub fn remove_page(self: &Arc<Self>, namespace: &str, page: &str) {
        let namespace_removed;
        {
            let mut state = self.state.lock();
            let prev_top = state.top_name().map(str::to_owned);
            let mut messages = state.remove_page(namespace, page);
            if messages.is_empty() {
                warn!(namespace = %namespace, page = %page, "remove of unknown page, dropped");
                return;
            }
            namespace_removed = state.get(namespace).is_none();
            if namespace_removed {
                messages.extend(self.restore_homescreen(&mut state));
            }
            self.publish(&state, prev_top.as_deref(), &messages);
        }
        if namespace_removed {
            self.cancel_expiry(namespace);
        }
    }

    /// Write a session-data binding (last-write-wins).
    pub fn set_value(self: &Arc<Self>, namespace: &str, key: &str, value: Value) {
        let mut state = self.state.lock();
        let prev_top = state.top_name().map(str::to_owned);
        let messages = state.set_value(namespace, key, value, self.default_lifetime);
        if messages.is_empty() {
            debug!(namespace = %namespace, key = %key, "reserved key, dropped");
            return;
        }
        self.publish(&state, prev_top.as_deref(), &messages);
    }

    /// Delete a session-data binding.
    pub fn delete_value(self: &Arc<Self>, namespace: &str, key: &str) {
        let mut state = self.state.lock();
        let prev_top = state.top_name().map(str::to_owned);
        let messages = state.delete_value(namespace, key);
        if messages.is_empty() {
            debug!(namespace = %namespace, key = %key, "delete of absent value, no-op");
            return;
        }
        self.publish(&state, prev_top.as_deref(), &messages);
    }

    /// Broadcast a skill-originated event to all attached clients. The
    /// referenced namespace must exist.
    pub fn send_event(&self, namespace: &str, name: &str, data: Value) {
        let state = self.state.lock();
        if state.get(namespace).is_none() {
            warn!(namespace = %namespace, event = %name, "event for unknown namespace, dropped");
            return;
        }
        self.broadcast_one(&GuiMessage::Event {
            namespace: namespace.to_string(),
            name: name.to_string(),
            data,
        });
    }

    // ── Inbound client events ───────────────────────────────────────

    /// Validate and apply a client-originated event.
    ///
    /// Unknown namespace/page references are rejected (the caller logs and
    /// drops the frame; the session stays connected).
    pub fn handle_client_event(
        self: &Arc<Self>,
        namespace: &str,
        event: &str,
        data: &Value,
    ) -> Result<(), ProtocolError> {
        if self.extension.is_idle_signal(event) {
            self.handle_idle();
            return Ok(());
        }

        match event {
            PAGE_GAINED_FOCUS => {
                let page = data.get("page").and_then(Value::as_str).ok_or(
                    ProtocolError::MissingEventField {
                        event: event.to_string(),
                        field: "page",
                    },
                )?;
                let mut state = self.state.lock();
                self.require_namespace(&state, namespace)?;
                let Some(position) = state.set_active_page(namespace, page) else {
                    return Err(ProtocolError::UnknownPage {
                        namespace: namespace.to_string(),
                        page: page.to_string(),
                    });
                };
                // rebroadcast so every mirror tracks the same focus
                self.broadcast_one(&GuiMessage::Event {
                    namespace: namespace.to_string(),
                    name: PAGE_GAINED_FOCUS.to_string(),
                    data: serde_json::json!({ "page": page, "position": position }),
                });
                Ok(())
            }
            GLOBAL_BACK => {
                let mut state = self.state.lock();
                self.require_namespace(&state, namespace)?;
                if state.top_name() != Some(namespace) {
                    debug!(namespace = %namespace, "back event for background namespace, ignored");
                    return Ok(());
                }
                let Some((removed, focus_page, focus)) = state.back_page(namespace) else {
                    debug!(namespace = %namespace, "back with no previous page, ignored");
                    return Ok(());
                };
                self.broadcast_one(&removed);
                self.broadcast_one(&GuiMessage::Event {
                    namespace: namespace.to_string(),
                    name: PAGE_GAINED_FOCUS.to_string(),
                    data: serde_json::json!({ "page": focus_page, "position": focus }),
                });
                Ok(())
            }
            PAGE_INTERACTION => {
                let extend = {
                    let state = self.state.lock();
                    self.require_namespace(&state, namespace)?;
                    // interaction keeps the foreground surface up longer
                    state.top_name() == Some(namespace)
                };
                if extend {
                    self.extend_expiry(namespace);
                }
                Ok(())
            }
            other => {
                {
                    let state = self.state.lock();
                    self.require_namespace(&state, namespace)?;
                }
                debug!(namespace = %namespace, event = %other, "relaying client event");
                self.broadcast_one(&GuiMessage::Event {
                    namespace: namespace.to_string(),
                    name: other.to_string(),
                    data: data.clone(),
                });
                Ok(())
            }
        }
    }

    /// Idle hook: consult the extension and apply its decision. A hook
    /// failure is logged and swallowed — idle handling degrades to no-op.
    pub fn handle_idle(self: &Arc<Self>) {
        let action = match self.extension.on_idle() {
            Ok(action) => action,
            Err(e) => {
                warn!(extension = self.extension.name(), error = %e, "idle hook failed, ignoring");
                return;
            }
        };
        let Some(name) = action.pin_namespace else {
            return;
        };
        info!(namespace = %name, "idle: pinning and raising homescreen");
        {
            let mut state = self.state.lock();
            let prev_top = state.top_name().map(str::to_owned);
            let messages = state.upsert_namespace(&name, Lifetime::Persistent);
            // the upsert lifetime only applies on creation; an existing
            // namespace keeps its bounded lifetime unless converted here
            let _ = state.set_lifetime(&name, Lifetime::Persistent);
            let _ = state.set_pinned(&name, true);
            self.publish(&state, prev_top.as_deref(), &messages);
        }
        // drop any expiry timer left over from before the pin
        self.reschedule_expiry(&name);
    }

    // ── Replay / sessions ───────────────────────────────────────────

    /// Snapshot the current state, queue its replay to `session_id`, and
    /// attach the session to live traffic.
    ///
    /// Runs entirely under the writer lock, so no mutation can land between
    /// the snapshot and the attach: nothing is lost, nothing is duplicated.
    pub fn attach_session(&self, session_id: &str) -> bool {
        let state = self.state.lock();
        let replay = replay_sequence(&state.snapshot());
        if !self.fanout.queue_replay(session_id, &replay) {
            warn!(session_id = %session_id, "replay to unknown session, dropped");
            return false;
        }
        self.fanout.attach(session_id);
        info!(
            session_id = %session_id,
            namespaces = state.len(),
            replay_messages = replay.len(),
            "session caught up and attached"
        );
        true
    }

    /// Point-in-time capture of the full stack.
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.lock().snapshot()
    }

    /// Number of namespaces currently in the stack.
    pub fn namespace_count(&self) -> usize {
        self.state.lock().len()
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Broadcast each mutation message in order, then announce a foreground
    /// change if one happened. Called with the writer lock held.
    fn publish(&self, state: &StateModel, prev_top: Option<&str>, messages: &[GuiMessage]) {
        for message in messages {
            self.broadcast_one(message);
        }
        #[allow(clippy::cast_precision_loss)]
        gauge!("gui_namespaces").set(state.len() as f64);

        if messages.is_empty() {
            return;
        }
        let top = state.top_name();
        if top != prev_top {
            if let Some(name) = top {
                self.broadcast_one(&GuiMessage::Event {
                    namespace: name.to_string(),
                    name: NAMESPACE_DISPLAYED.to_string(),
                    data: Value::Null,
                });
            }
        }
    }

    fn broadcast_one(&self, message: &GuiMessage) {
        counter!("gui_messages_sent_total", "type" => message.message_type()).increment(1);
        self.fanout.broadcast(message);
    }

    #[allow(clippy::unused_self)]
    fn require_namespace(&self, state: &StateModel, namespace: &str) -> Result<(), ProtocolError> {
        if state.get(namespace).is_some() {
            Ok(())
        } else {
            Err(ProtocolError::UnknownNamespace {
                namespace: namespace.to_string(),
            })
        }
    }

    /// When a removal empties the stack, a homescreen-capable extension may
    /// re-pin its homescreen. Hook failures degrade to "no homescreen".
    fn restore_homescreen(&self, state: &mut StateModel) -> Vec<GuiMessage> {
        if !state.is_empty() || !self.extension.homescreen_supported() {
            return Vec::new();
        }
        match self.extension.on_idle() {
            Ok(action) => action
                .pin_namespace
                .map(|name| {
                    info!(namespace = %name, "stack emptied, restoring homescreen");
                    let messages = state.upsert_namespace(&name, Lifetime::Persistent);
                    let _ = state.set_pinned(&name, true);
                    messages
                })
                .unwrap_or_default(),
            Err(e) => {
                warn!(
                    extension = self.extension.name(),
                    error = %e,
                    "homescreen hook failed, completing removal without it"
                );
                Vec::new()
            }
        }
    }

    // ── Expiry timers ───────────────────────────────────────────────

    /// Restart a namespace's removal timer from its configured lifetime.
    /// Persistent namespaces get any pending timer cancelled instead.
    fn reschedule_expiry(self: &Arc<Self>, name: &str) {
        let lifetime = self.state.lock().get(name).map(|ns| ns.lifetime);
        match lifetime {
            Some(Lifetime::Seconds(secs)) => self.schedule_expiry(name, secs),
            Some(Lifetime::Persistent) | None => self.cancel_expiry(name),
        }
    }

    /// Interaction pushes the deadline out by an extra half lifetime.
    fn extend_expiry(self: &Arc<Self>, name: &str) {
        let lifetime = self.state.lock().get(name).map(|ns| ns.lifetime);
        if let Some(Lifetime::Seconds(secs)) = lifetime {
            self.schedule_expiry(name, secs.saturating_add(secs / 2));
        }
    }

    fn schedule_expiry(self: &Arc<Self>, name: &str, secs: u64) {
        // Timers need a runtime; without one (sync unit tests) expiry is
        // driven by calling remove_namespace directly.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let token = CancellationToken::new();
        if let Some(prev) = self
            .expiry_timers
            .lock()
            .insert(name.to_string(), token.clone())
        {
            prev.cancel();
        }

        let dispatcher = Arc::clone(self);
        let namespace = name.to_string();
        drop(handle.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(Duration::from_secs(secs)) => {
                    debug!(namespace = %namespace, "namespace lifetime expired");
                    dispatcher.remove_namespace(&namespace);
                }
            }
        }));
    }

    fn cancel_expiry(&self, name: &str) {
        if let Some(token) = self.expiry_timers.lock().remove(name) {
            token.cancel();
        }
    }
}
