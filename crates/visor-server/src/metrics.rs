//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// The full metric inventory this service exports. Messages-sent and the
// namespace gauge are emitted from visor-state's dispatcher; the rest from
// this crate.

/// Messages broadcast to clients (counter, labels: type).
pub const GUI_MESSAGES_SENT_TOTAL: &str = "gui_messages_sent_total";
/// Messages dropped because a client queue was full (counter).
pub const GUI_MESSAGES_DROPPED_TOTAL: &str = "gui_messages_dropped_total";
/// WebSocket connections opened total (counter).
pub const GUI_CONNECTIONS_TOTAL: &str = "gui_connections_total";
/// WebSocket disconnections total (counter).
pub const GUI_DISCONNECTIONS_TOTAL: &str = "gui_disconnections_total";
/// Active WebSocket connections (gauge).
pub const GUI_CONNECTIONS: &str = "gui_connections";
/// Namespaces currently in the GUI stack (gauge).
pub const GUI_NAMESPACES: &str = "gui_namespaces";
/// Connection lifetime (histogram).
pub const GUI_CONNECTION_DURATION_SECONDS: &str = "gui_connection_duration_seconds";
