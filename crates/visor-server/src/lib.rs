//! # visor-server
//!
//! Axum HTTP + `WebSocket` server for GUI rendering clients.
//!
//! - HTTP endpoints: health check, Prometheus metrics
//! - `WebSocket` gateway at `/gui`: handshake, heartbeat, frame dispatch
//! - Per-client bounded outbound queues; a queue that overflows forces the
//!   client off rather than stalling the broadcast path
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;
