//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`VisorSettings::default()`]
//! 2. If `~/.visor/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{ExtensionVariant, PinnedPrecedence, VisorSettings};

/// Resolve the path to the settings file (`~/.visor/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".visor").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<VisorSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<VisorSettings> {
    let defaults = serde_json::to_value(VisorSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: VisorSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules; invalid values are logged and
/// ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut VisorSettings) {
    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("VISOR_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("VISOR_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("VISOR_MAX_CONNECTIONS", 1, 10_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_env_usize("VISOR_QUEUE_SIZE", 1, 65_536) {
        settings.server.outbound_queue_size = v;
    }
    if let Some(v) = read_env_u64("VISOR_HEARTBEAT_INTERVAL", 1000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }

    // ── Extension settings ──────────────────────────────────────────
    if let Some(raw) = read_env_string("VISOR_EXTENSION") {
        match parse_variant(&raw) {
            Some(v) => settings.extension.variant = v,
            None => tracing::warn!(value = %raw, "unknown VISOR_EXTENSION, ignoring"),
        }
    }
    if let Some(v) = read_env_string("VISOR_HOMESCREEN_NAMESPACE") {
        settings.extension.homescreen_namespace = v;
    }
    if let Some(raw) = read_env_string("VISOR_PINNED_PRECEDENCE") {
        match parse_precedence(&raw) {
            Some(v) => settings.extension.pinned_precedence = v,
            None => tracing::warn!(value = %raw, "unknown VISOR_PINNED_PRECEDENCE, ignoring"),
        }
    }
    if let Some(v) = read_env_u64("VISOR_IDLE_TIMEOUT", 1, 86_400) {
        settings.extension.idle_timeout_secs = v;
    }

    // ── Protocol / lifetime / logging ───────────────────────────────
    if let Some(v) = read_env_u64("VISOR_DEFAULT_CAPABILITY", 1, u64::from(u32::MAX)) {
        #[allow(clippy::cast_possible_truncation)]
        {
            settings.protocol.default_capability = v as u32;
        }
    }
    if let Some(v) = read_env_u64("VISOR_LIFETIME_SECS", 1, 86_400) {
        settings.lifetime.default_secs = v;
    }
    if let Some(v) = read_env_string("VISOR_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse an extension variant name (case-insensitive).
pub fn parse_variant(val: &str) -> Option<ExtensionVariant> {
    match val.trim().to_lowercase().as_str() {
        "generic" => Some(ExtensionVariant::Generic),
        "smartspeaker" => Some(ExtensionVariant::Smartspeaker),
        "mobile" => Some(ExtensionVariant::Mobile),
        "bigscreen" => Some(ExtensionVariant::Bigscreen),
        _ => None,
    }
}

/// Parse a pinned-precedence policy name (case-insensitive).
pub fn parse_precedence(val: &str) -> Option<PinnedPrecedence> {
    match val.trim().to_lowercase().as_str() {
        "displaceable" => Some(PinnedPrecedence::Displaceable),
        "anchored" => Some(PinnedPrecedence::Anchored),
        _ => None,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 18181, "host": "0.0.0.0"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.port, 18181);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, r#"{{"extension": {{"variant": "mobile"}}}}"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.extension.variant, ExtensionVariant::Mobile);
        assert_eq!(settings.server.port, 18181);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{{not json").unwrap();

        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn settings_path_under_visor_dir() {
        let path = settings_path();
        assert!(path.to_string_lossy().contains(".visor"));
        assert!(path.to_string_lossy().ends_with("settings.json"));
    }

    // ── parse helpers (the layer the env vars feed through) ─────────

    #[test]
    fn parse_u16_valid_and_bounds() {
        assert_eq!(parse_u16_range("18181", 1, 65535), Some(18_181));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("not-a-port", 1, 65535), None);
    }

    #[test]
    fn parse_u64_valid_and_bounds() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("abc", 1000, 600_000), None);
    }

    #[test]
    fn parse_usize_valid_and_bounds() {
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("20000", 1, 10_000), None);
    }

    #[test]
    fn parse_variant_names() {
        assert_eq!(parse_variant("smartspeaker"), Some(ExtensionVariant::Smartspeaker));
        assert_eq!(parse_variant("BIGSCREEN"), Some(ExtensionVariant::Bigscreen));
        assert_eq!(parse_variant("toaster"), None);
    }

    #[test]
    fn parse_precedence_names() {
        assert_eq!(parse_precedence("anchored"), Some(PinnedPrecedence::Anchored));
        assert_eq!(
            parse_precedence("Displaceable"),
            Some(PinnedPrecedence::Displaceable)
        );
        assert_eq!(parse_precedence(""), None);
    }
}
