//! WebSocket session lifecycle — one connected rendering client from upgrade
//! through disconnect.
//!
//! The first text frame must be the `connected` handshake; only then does the
//! session get its replay and start receiving live broadcasts. Everything
//! after the handshake is validated client events.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use visor_core::Capability;
use visor_settings::VisorSettings;
use visor_state::Dispatcher;

use crate::metrics::GUI_CONNECTION_DURATION_SECONDS;
use crate::registry::ConnectionRegistry;

use super::connection::ClientSession;
use super::handler;
use super::heartbeat::{run_heartbeat, HeartbeatResult};

/// Per-session knobs lifted out of the full settings tree.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Outbound queue capacity; overflow forces a disconnect.
    pub queue_size: usize,
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// Time without a pong before the client is considered dead.
    pub pong_timeout: Duration,
    /// Capability assumed for clients whose handshake omits one.
    pub default_capability: u32,
}

impl From<&VisorSettings> for SessionConfig {
    fn from(settings: &VisorSettings) -> Self {
        Self {
            queue_size: settings.server.outbound_queue_size,
            ping_interval: Duration::from_millis(settings.server.heartbeat_interval_ms),
            pong_timeout: Duration::from_millis(settings.server.heartbeat_timeout_ms),
            default_capability: settings.protocol.default_capability,
        }
    }
}

/// Run a WebSocket session for a connected rendering client.
///
/// 1. Registers the session (refused if the server is at capacity)
/// 2. Requires the `connected` handshake as the first text frame, then
///    queues the state replay and attaches the session
/// 3. Dispatches subsequent frames as client events (invalid ones dropped)
/// 4. Sends periodic Ping frames; the heartbeat task forces unresponsive
///    clients off
/// 5. Cleans up on disconnect
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_gui_session(
    ws: WebSocket,
    session_id: String,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    config: SessionConfig,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.queue_size);
    let session = Arc::new(ClientSession::new(
        session_id.clone(),
        send_tx,
        Capability::new(config.default_capability),
    ));

    if !registry.register(session.clone()) {
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }
    info!("client connected");

    let cancel = session.cancel_token();

    // Outbound forwarder with periodic Ping frames. A tripped cancel token
    // (overflow, heartbeat timeout, shutdown) closes the socket from here.
    let outbound_cancel = cancel.clone();
    let ping_interval = config.ping_interval;
    let outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Liveness watchdog; trips the cancel token when pongs stop.
    let hb_session = session.clone();
    let hb_cancel = cancel.clone();
    let pong_timeout = config.pong_timeout;
    let heartbeat = tokio::spawn(async move {
        let result = run_heartbeat(
            hb_session.clone(),
            ping_interval,
            pong_timeout,
            hb_cancel,
        )
        .await;
        if result == HeartbeatResult::TimedOut {
            warn!(session_id = %hb_session.id, "client unresponsive, disconnecting");
            hb_session.disconnect();
        }
    });

    let mut handshaken = false;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            maybe = ws_rx.next() => {
                let Some(Ok(msg)) = maybe else { break };
                match msg {
                    Message::Text(text) => {
                        if handshaken {
                            if let Err(e) = handler::handle_frame(&text, &dispatcher) {
                                warn!(error = %e, "dropping invalid frame");
                            }
                        } else {
                            match handler::parse_handshake(&text) {
                                Ok((framework, version)) => {
                                    let capability = Capability::negotiate(
                                        version,
                                        config.default_capability,
                                    );
                                    session.set_capability(capability);
                                    info!(framework = %framework, %capability, "renderer handshake");
                                    let _ = dispatcher.attach_session(&session.id);
                                    handshaken = true;
                                }
                                Err(e) => {
                                    warn!(error = %e, "handshake failed, closing");
                                    session.disconnect();
                                    break;
                                }
                            }
                        }
                    }
                    Message::Binary(data) => {
                        debug!(len = data.len(), "binary frame ignored");
                    }
                    Message::Ping(_) | Message::Pong(_) => {
                        session.mark_alive();
                    }
                    Message::Close(_) => {
                        info!("client sent close frame");
                        break;
                    }
                }
            }
        }
    }

    info!(dropped = session.drop_count(), "client disconnected");
    histogram!(GUI_CONNECTION_DURATION_SECONDS).record(session.age().as_secs_f64());
    registry.unregister(&session.id);
    outbound.abort();
    heartbeat.abort();
}
