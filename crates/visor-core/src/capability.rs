//! Protocol capability (renderer version) negotiated at handshake.

use serde::{Deserialize, Serialize};

/// The protocol version a rendering client speaks.
///
/// Carried in the `connected` handshake; clients that omit it are assumed
/// to speak the configured default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(u32);

impl Capability {
    /// Wrap an explicit version number.
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Resolve the handshake-declared version against the configured
    /// default for clients that omit it.
    pub fn negotiate(declared: Option<u32>, default: u32) -> Self {
        Self(declared.unwrap_or(default))
    }

    /// The raw version number.
    pub const fn version(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_prefers_declared() {
        assert_eq!(Capability::negotiate(Some(3), 1), Capability::new(3));
    }

    #[test]
    fn negotiate_falls_back_to_default() {
        assert_eq!(Capability::negotiate(None, 1), Capability::new(1));
    }

    #[test]
    fn display_format() {
        assert_eq!(Capability::new(2).to_string(), "v2");
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&Capability::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: Capability = serde_json::from_str("7").unwrap();
        assert_eq!(back.version(), 7);
    }
}
