//! # visor-settings
//!
//! Configuration management with layered sources for the Visor GUI service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`VisorSettings::default()`]
//! 2. **User file** — `~/.visor/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `VISOR_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use visor_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton, initialized on first access via
/// [`get_settings`] or explicitly via [`init_settings`].
static SETTINGS: OnceLock<VisorSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.visor/settings.json` with env var
/// overrides. On subsequent calls, returns the cached value. If loading
/// fails, returns compiled defaults.
pub fn get_settings() -> &'static VisorSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: VisorSettings) -> std::result::Result<(), VisorSettings> {
    SETTINGS.set(settings)
}
