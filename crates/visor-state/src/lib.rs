//! # visor-state
//!
//! The canonical in-memory model of what the voice assistant's visual
//! interface currently shows, and the machinery that keeps every connected
//! rendering client consistent with it:
//!
//! - [`model`] — the ordered namespace stack with pages and session data
//! - [`dispatcher`] — the single-writer mutation path; every state change
//!   funnels through it and fans out as exactly one message per mutation
//! - [`replay`] — deterministic catch-up sequences for newly joined clients
//! - [`extensions`] — platform-specific idle/homescreen policy

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod extensions;
pub mod model;
pub mod replay;

pub use dispatcher::{Dispatcher, Fanout};
pub use extensions::{build_extension, ExtensionError, GuiExtension, IdleAction};
pub use model::{GuiNamespace, Lifetime, StateModel, StateSnapshot};
pub use replay::replay_sequence;
