//! # visor-core
//!
//! Wire-format types for the GUI synchronization protocol: the
//! self-describing message envelope exchanged with rendering clients,
//! protocol capability negotiation, and the shared error taxonomy.

#![deny(unsafe_code)]

pub mod capability;
pub mod envelope;
pub mod errors;

pub use capability::Capability;
pub use envelope::GuiMessage;
pub use errors::ProtocolError;
