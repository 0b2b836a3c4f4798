//! GUI wire-format envelope matching the rendering-client WebSocket protocol.
//!
//! Every frame on the wire is one JSON object with a `type` tag. Mutation
//! messages (`namespace-*`, `page-*`, `value-*`) flow server → client only;
//! `event` is bidirectional; `connected` is the client handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A protocol envelope, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GuiMessage {
    /// Client handshake announcing its rendering framework and, optionally,
    /// the protocol version it speaks. Clients that omit the version are
    /// assumed to speak the configured default.
    Connected {
        /// Rendering framework identifier (e.g. `qt5`, `web`).
        framework: String,
        /// Protocol version, if the client declares one.
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<u32>,
    },

    /// A namespace entered the stack at `position`.
    NamespaceInsert {
        /// Namespace (skill) name.
        namespace: String,
        /// Stack position it was inserted at.
        position: usize,
    },

    /// An existing namespace moved from one stack position to another.
    NamespaceMove {
        /// Namespace name.
        namespace: String,
        /// Previous stack position.
        from: usize,
        /// New stack position.
        to: usize,
    },

    /// A namespace left the stack.
    NamespaceRemove {
        /// Namespace name.
        namespace: String,
        /// Stack position it held when removed.
        position: usize,
    },

    /// A page was inserted into a namespace's page sequence.
    PageInsert {
        /// Owning namespace.
        namespace: String,
        /// Opaque page identifier/URI.
        page: String,
        /// Index within the namespace's page sequence.
        position: usize,
    },

    /// A page was removed from a namespace's page sequence.
    PageRemove {
        /// Owning namespace.
        namespace: String,
        /// Opaque page identifier/URI.
        page: String,
        /// Index the page held when removed.
        position: usize,
    },

    /// A session-data binding was written (last-write-wins per key).
    ValueSet {
        /// Owning namespace.
        namespace: String,
        /// Data key.
        key: String,
        /// Arbitrary structured value.
        value: Value,
    },

    /// A session-data binding was deleted.
    ValueDelete {
        /// Owning namespace.
        namespace: String,
        /// Data key.
        key: String,
    },

    /// A typed event. Inbound: client interaction referencing a namespace
    /// (and usually a page). Outbound: a state notification such as
    /// `namespace.displayed`.
    Event {
        /// Namespace the event refers to.
        namespace: String,
        /// Event name (e.g. `page-gained-focus`).
        name: String,
        /// Event payload.
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
    },
}

impl GuiMessage {
    /// The wire `type` tag of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::NamespaceInsert { .. } => "namespace-insert",
            Self::NamespaceMove { .. } => "namespace-move",
            Self::NamespaceRemove { .. } => "namespace-remove",
            Self::PageInsert { .. } => "page-insert",
            Self::PageRemove { .. } => "page-remove",
            Self::ValueSet { .. } => "value-set",
            Self::ValueDelete { .. } => "value-delete",
            Self::Event { .. } => "event",
        }
    }

    /// The namespace this message refers to, if any.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Connected { .. } => None,
            Self::NamespaceInsert { namespace, .. }
            | Self::NamespaceMove { namespace, .. }
            | Self::NamespaceRemove { namespace, .. }
            | Self::PageInsert { namespace, .. }
            | Self::PageRemove { namespace, .. }
            | Self::ValueSet { namespace, .. }
            | Self::ValueDelete { namespace, .. }
            | Self::Event { namespace, .. } => Some(namespace),
        }
    }

    /// Whether a client is allowed to originate this message type.
    ///
    /// Everything else is a server-side mutation notification; receiving
    /// one from a client is a protocol violation.
    pub fn is_client_origin(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Event { .. })
    }
}
