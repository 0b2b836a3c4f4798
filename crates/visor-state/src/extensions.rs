//! Platform extensions: idle and homescreen policy.
//!
//! A closed set of variants chosen once at startup from configuration. The
//! dispatcher consults the selected extension at two hook points (idle timer
//! tick, last-namespace removal) and isolates any hook failure — a broken
//! extension never blocks the triggering mutation.

use std::sync::Arc;

use thiserror::Error;
use visor_settings::{ExtensionSettings, ExtensionVariant};

/// Event names every homescreen-capable variant treats as an idle signal.
const IDLE_EVENTS: &[&str] = &["idle", "device.show.idle"];

/// A hook failure inside an extension.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The hook could not produce a decision.
    #[error("extension hook '{hook}' failed: {reason}")]
    Hook {
        /// Which hook failed.
        hook: &'static str,
        /// Why.
        reason: String,
    },
}

/// What the idle hook wants done. `pin_namespace: None` means no-op.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdleAction {
    /// Namespace to pin and raise to the foreground.
    pub pin_namespace: Option<String>,
}

/// Platform-specific GUI policy consulted by the dispatcher.
pub trait GuiExtension: Send + Sync {
    /// Variant name, for logging.
    fn name(&self) -> &'static str;

    /// Whether an inbound event signals that the device has gone idle.
    fn is_idle_signal(&self, event_name: &str) -> bool;

    /// Decide what happens on an idle timer tick or idle signal.
    fn on_idle(&self) -> Result<IdleAction, ExtensionError>;

    /// Whether this platform has a homescreen surface at all.
    fn homescreen_supported(&self) -> bool;
}

/// Baseline extension; homescreen support is a configuration flag.
pub struct GenericExtension {
    homescreen: bool,
    homescreen_namespace: String,
}

impl GuiExtension for GenericExtension {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn is_idle_signal(&self, event_name: &str) -> bool {
        self.homescreen && IDLE_EVENTS.contains(&event_name)
    }

    fn on_idle(&self) -> Result<IdleAction, ExtensionError> {
        if self.homescreen {
            Ok(IdleAction {
                pin_namespace: Some(self.homescreen_namespace.clone()),
            })
        } else {
            Ok(IdleAction::default())
        }
    }

    fn homescreen_supported(&self) -> bool {
        self.homescreen
    }
}

/// Smart-speaker displays: always return to the homescreen when idle.
pub struct SmartspeakerExtension {
    homescreen_namespace: String,
}

impl GuiExtension for SmartspeakerExtension {
    fn name(&self) -> &'static str {
        "smartspeaker"
    }

    fn is_idle_signal(&self, event_name: &str) -> bool {
        IDLE_EVENTS.contains(&event_name)
    }

    fn on_idle(&self) -> Result<IdleAction, ExtensionError> {
        Ok(IdleAction {
            pin_namespace: Some(self.homescreen_namespace.clone()),
        })
    }

    fn homescreen_supported(&self) -> bool {
        true
    }
}

/// Mobile companion renderers: the host OS owns idle behavior.
pub struct MobileExtension;

impl GuiExtension for MobileExtension {
    fn name(&self) -> &'static str {
        "mobile"
    }

    fn is_idle_signal(&self, _event_name: &str) -> bool {
        false
    }

    fn on_idle(&self) -> Result<IdleAction, ExtensionError> {
        Ok(IdleAction::default())
    }

    fn homescreen_supported(&self) -> bool {
        false
    }
}

/// TV-class displays: no homescreen, idle is a no-op.
pub struct BigscreenExtension;

impl GuiExtension for BigscreenExtension {
    fn name(&self) -> &'static str {
        "bigscreen"
    }

    fn is_idle_signal(&self, _event_name: &str) -> bool {
        false
    }

    fn on_idle(&self) -> Result<IdleAction, ExtensionError> {
        Ok(IdleAction::default())
    }

    fn homescreen_supported(&self) -> bool {
        false
    }
}

/// Build the configured extension variant.
pub fn build_extension(settings: &ExtensionSettings) -> Arc<dyn GuiExtension> {
    match settings.variant {
        ExtensionVariant::Generic => Arc::new(GenericExtension {
            homescreen: settings.generic_homescreen,
            homescreen_namespace: settings.homescreen_namespace.clone(),
        }),
        ExtensionVariant::Smartspeaker => Arc::new(SmartspeakerExtension {
            homescreen_namespace: settings.homescreen_namespace.clone(),
        }),
        ExtensionVariant::Mobile => Arc::new(MobileExtension),
        ExtensionVariant::Bigscreen => Arc::new(BigscreenExtension),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(variant: ExtensionVariant, homescreen: bool) -> ExtensionSettings {
        ExtensionSettings {
            variant,
            generic_homescreen: homescreen,
            ..ExtensionSettings::default()
        }
    }

    #[test]
    fn generic_without_homescreen_is_inert() {
        let ext = build_extension(&settings(ExtensionVariant::Generic, false));
        assert_eq!(ext.name(), "generic");
        assert!(!ext.homescreen_supported());
        assert!(!ext.is_idle_signal("idle"));
        assert_eq!(ext.on_idle().unwrap(), IdleAction::default());
    }

    #[test]
    fn generic_with_homescreen_pins_it() {
        let ext = build_extension(&settings(ExtensionVariant::Generic, true));
        assert!(ext.homescreen_supported());
        assert!(ext.is_idle_signal("idle"));
        assert_eq!(
            ext.on_idle().unwrap().pin_namespace.as_deref(),
            Some("homescreen")
        );
    }

    #[test]
    fn smartspeaker_always_returns_home() {
        let ext = build_extension(&settings(ExtensionVariant::Smartspeaker, false));
        assert_eq!(ext.name(), "smartspeaker");
        assert!(ext.is_idle_signal("device.show.idle"));
        assert!(!ext.is_idle_signal("page-interaction"));
        assert_eq!(
            ext.on_idle().unwrap().pin_namespace.as_deref(),
            Some("homescreen")
        );
    }

    #[test]
    fn mobile_and_bigscreen_ignore_idle() {
        for variant in [ExtensionVariant::Mobile, ExtensionVariant::Bigscreen] {
            let ext = build_extension(&settings(variant, true));
            assert!(!ext.homescreen_supported());
            assert!(!ext.is_idle_signal("idle"));
            assert!(ext.on_idle().unwrap().pin_namespace.is_none());
        }
    }

    #[test]
    fn custom_homescreen_namespace_propagates() {
        let mut s = settings(ExtensionVariant::Smartspeaker, false);
        s.homescreen_namespace = "skill-homescreen.openvoiceos".into();
        let ext = build_extension(&s);
        assert_eq!(
            ext.on_idle().unwrap().pin_namespace.as_deref(),
            Some("skill-homescreen.openvoiceos")
        );
    }

    #[test]
    fn hook_error_display() {
        let err = ExtensionError::Hook {
            hook: "on_idle",
            reason: "backing service unavailable".into(),
        };
        assert!(err.to_string().contains("on_idle"));
    }
}
