//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` on the wire. Each type
//! implements [`Default`] with production default values. Types marked with
//! `#[serde(default)]` allow partial JSON — missing fields get their default
//! value during deserialization.

use serde::{Deserialize, Serialize};

/// Root settings type for the Visor GUI service.
///
/// Loaded from `~/.visor/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values. Example:
///
/// ```json
/// {
///   "server": { "port": 18181 },
///   "extension": { "variant": "smartspeaker" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisorSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Platform extension selection and homescreen policy.
    pub extension: ExtensionSettings,
    /// Wire-protocol defaults.
    pub protocol: ProtocolSettings,
    /// Namespace lifetime defaults.
    pub lifetime: LifetimeSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// GUI WebSocket port.
    pub port: u16,
    /// Maximum number of simultaneously connected rendering clients.
    pub max_connections: usize,
    /// Per-session outbound queue capacity; overflow forces a disconnect.
    pub outbound_queue_size: usize,
    /// WebSocket ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Time without a pong before a connection is considered dead.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18181,
            max_connections: 50,
            outbound_queue_size: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
        }
    }
}

/// Which platform extension runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionVariant {
    /// Baseline behavior; homescreen support is configurable.
    #[default]
    Generic,
    /// Smart-speaker displays: homescreen, idle returns to it.
    Smartspeaker,
    /// Mobile companion renderers: no homescreen, idle is a no-op.
    Mobile,
    /// TV-class displays: no homescreen, idle is a no-op.
    Bigscreen,
}

/// How a pinned namespace interacts with ordinary stack reordering.
///
/// Upstream behavior is ambiguous here, so it is a policy knob rather than
/// a hard-coded rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinnedPrecedence {
    /// Pinning only exempts a namespace from empty-removal; any namespace
    /// can still be raised above it.
    #[default]
    Displaceable,
    /// A pinned namespace holds position 0; other activations slot in at
    /// position 1. Explicitly raising the pinned namespace still works.
    Anchored,
}

/// Platform extension selection and homescreen policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionSettings {
    /// Selected extension variant.
    pub variant: ExtensionVariant,
    /// Whether the generic extension supports a homescreen. Ignored by the
    /// platform variants, which have fixed behavior.
    pub generic_homescreen: bool,
    /// Namespace pinned and raised when the idle hook fires.
    pub homescreen_namespace: String,
    /// Pinned-namespace reordering policy.
    pub pinned_precedence: PinnedPrecedence,
    /// Seconds of inactivity before the idle hook fires.
    pub idle_timeout_secs: u64,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            variant: ExtensionVariant::Generic,
            generic_homescreen: false,
            homescreen_namespace: "homescreen".to_string(),
            pinned_precedence: PinnedPrecedence::Displaceable,
            idle_timeout_secs: 60,
        }
    }
}

/// Wire-protocol defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// Capability (renderer version) assumed for clients whose handshake
    /// omits one.
    pub default_capability: u32,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            default_capability: 1,
        }
    }
}

/// Namespace lifetime defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifetimeSettings {
    /// Seconds a non-persistent namespace stays up after its last
    /// activation before it is removed automatically.
    pub default_secs: u64,
}

impl Default for LifetimeSettings {
    fn default() -> Self {
        Self { default_secs: 30 }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON-formatted log lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = VisorSettings::default();
        assert_eq!(s.server.port, 18181);
        assert_eq!(s.extension.variant, ExtensionVariant::Generic);
        assert_eq!(s.extension.pinned_precedence, PinnedPrecedence::Displaceable);
        assert_eq!(s.protocol.default_capability, 1);
        assert_eq!(s.lifetime.default_secs, 30);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: VisorSettings =
            serde_json::from_str(r#"{"server": {"port": 9090}}"#).unwrap();
        assert_eq!(s.server.port, 9090);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.extension.homescreen_namespace, "homescreen");
    }

    #[test]
    fn variant_parses_lowercase() {
        let s: VisorSettings =
            serde_json::from_str(r#"{"extension": {"variant": "smartspeaker"}}"#).unwrap();
        assert_eq!(s.extension.variant, ExtensionVariant::Smartspeaker);
    }

    #[test]
    fn pinned_precedence_parses_lowercase() {
        let s: VisorSettings =
            serde_json::from_str(r#"{"extension": {"pinnedPrecedence": "anchored"}}"#).unwrap();
        assert_eq!(s.extension.pinned_precedence, PinnedPrecedence::Anchored);
    }

    #[test]
    fn unknown_variant_is_an_error() {
        let result =
            serde_json::from_str::<VisorSettings>(r#"{"extension": {"variant": "toaster"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn settings_roundtrip() {
        let s = VisorSettings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: VisorSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, s.server.port);
        assert_eq!(back.extension.variant, s.extension.variant);
    }

    #[test]
    fn camel_case_on_the_wire() {
        let json = serde_json::to_string(&VisorSettings::default()).unwrap();
        assert!(json.contains("maxConnections"));
        assert!(json.contains("homescreenNamespace"));
        assert!(json.contains("defaultCapability"));
        assert!(!json.contains("max_connections"));
    }
}
