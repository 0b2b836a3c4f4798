//! `VisorServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;
use visor_settings::VisorSettings;
use visor_state::Dispatcher;

use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{run_gui_session, SessionConfig};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection registry for session lookup and fan-out.
    pub registry: Arc<ConnectionRegistry>,
    /// The single-writer state dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Per-session configuration.
    pub session_config: SessionConfig,
    /// When the server started (monotonic).
    pub start_time: Instant,
    /// When the server started (wall clock).
    pub started_at: DateTime<Utc>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The GUI message bus server.
pub struct VisorServer {
    settings: VisorSettings,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl VisorServer {
    /// Create a new server over an already-wired registry and dispatcher.
    pub fn new(
        settings: VisorSettings,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<ConnectionRegistry>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            settings,
            registry,
            dispatcher,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            session_config: SessionConfig::from(&self.settings),
            start_time: self.start_time,
            started_at: self.started_at,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/gui", get(gui_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and start serving. Returns the bound address and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind((
            self.settings.server.host.as_str(),
            self.settings.server.port,
        ))
        .await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "gui server listening");
        Ok((addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server settings.
    pub fn settings(&self) -> &VisorSettings {
        &self.settings
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.started_at,
        state.registry.count(),
        state.dispatcher.namespace_count(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// GET /gui — WebSocket upgrade for rendering clients.
async fn gui_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let session_id = Uuid::now_v7().to_string();
    ws.on_upgrade(move |socket| {
        run_gui_session(
            socket,
            session_id,
            state.registry,
            state.dispatcher,
            state.session_config,
        )
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;
    use visor_state::build_extension;

    fn make_server() -> VisorServer {
        let mut settings = VisorSettings::default();
        settings.server.port = 0;
        let registry = Arc::new(ConnectionRegistry::new(settings.server.max_connections));
        let extension = build_extension(&settings.extension);
        let dispatcher = Dispatcher::new(&settings, extension, registry.clone());
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        VisorServer::new(settings, dispatcher, registry, metrics)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["namespaces"], 0);
    }

    #[tokio::test]
    async fn health_reports_namespace_count() {
        let server = make_server();
        server.dispatcher().upsert_namespace("weather", None);
        let app = server.router();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["namespaces"], 1);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gui_endpoint_requires_upgrade() {
        let server = make_server();
        let app = server.router();

        // plain GET without the upgrade headers is rejected
        let req = Request::builder().uri("/gui").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_and_shuts_down() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("shutdown timed out")
            .expect("join error");
    }

    #[test]
    fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }

    #[test]
    fn settings_accessible() {
        let server = make_server();
        assert_eq!(server.settings().server.max_connections, 50);
    }
}
