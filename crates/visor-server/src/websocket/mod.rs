//! WebSocket connection management, handshake, heartbeat, and frame dispatch.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
