//! Inbound frame dispatch — parses text frames as wire envelopes and routes
//! client events into the dispatcher.
//!
//! Rejected frames are dropped and logged by the caller; no error envelope
//! goes back and the session stays connected.

use std::sync::Arc;

use visor_core::{GuiMessage, ProtocolError};
use visor_state::Dispatcher;

use tracing::debug;

/// Parse the opening frame of a session as the `connected` handshake.
///
/// Returns the declared framework name and optional capability version.
pub fn parse_handshake(text: &str) -> Result<(String, Option<u32>), ProtocolError> {
    match serde_json::from_str::<GuiMessage>(text)? {
        GuiMessage::Connected { framework, version } => Ok((framework, version)),
        other => Err(ProtocolError::HandshakeExpected {
            message_type: other.message_type().to_string(),
        }),
    }
}

/// Handle a steady-state inbound text frame.
///
/// Only client-origin envelopes are accepted: `event` frames go through the
/// dispatcher's validation path, a repeated `connected` is ignored, and
/// server-origin mutation types are rejected outright.
pub fn handle_frame(text: &str, dispatcher: &Arc<Dispatcher>) -> Result<(), ProtocolError> {
    match serde_json::from_str::<GuiMessage>(text)? {
        GuiMessage::Connected { framework, .. } => {
            debug!(framework = %framework, "duplicate handshake, ignored");
            Ok(())
        }
        GuiMessage::Event {
            namespace,
            name,
            data,
        } => dispatcher.handle_client_event(&namespace, &name, &data),
        other => Err(ProtocolError::NotClientOrigin {
            message_type: other.message_type().to_string(),
        }),
    }
}
