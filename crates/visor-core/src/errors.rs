//! Protocol-level error taxonomy.

use thiserror::Error;

/// Why an inbound frame was rejected.
///
/// None of these are fatal to the session: the offending frame is dropped
/// and logged, no error envelope is sent back.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A client sent a message type only the server may originate.
    #[error("message type '{message_type}' is not valid from a client")]
    NotClientOrigin {
        /// The offending `type` tag.
        message_type: String,
    },

    /// An event referenced a namespace that is not in the stack.
    #[error("unknown namespace '{namespace}'")]
    UnknownNamespace {
        /// The referenced namespace.
        namespace: String,
    },

    /// An event referenced a page its namespace does not contain.
    #[error("unknown page '{page}' in namespace '{namespace}'")]
    UnknownPage {
        /// The referenced namespace.
        namespace: String,
        /// The referenced page.
        page: String,
    },

    /// An event arrived without a field its type requires.
    #[error("event '{event}' missing required field '{field}'")]
    MissingEventField {
        /// The event name.
        event: String,
        /// The absent field.
        field: &'static str,
    },

    /// A handshake was expected but something else arrived.
    #[error("expected 'connected' handshake, got '{message_type}'")]
    HandshakeExpected {
        /// The `type` tag that arrived instead.
        message_type: String,
    },
}
