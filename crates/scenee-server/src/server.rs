//! `SceneeServer`: axum router and serve loop.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use scenee_settings::SceneeSettings;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::identity::IdentityResolver;
use crate::metrics;
use crate::realtime::broadcast::EventBroadcaster;
use crate::realtime::delivery::DeliveryOptions;
use crate::realtime::registry::ConnectionRegistry;
use crate::realtime::sse::events_handler;
use crate::shutdown::ShutdownCoordinator;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Current session per user.
    pub registry: Arc<ConnectionRegistry>,
    /// Resolves the caller of `/events`.
    pub identity: Arc<dyn IdentityResolver>,
    /// Timing for new sessions.
    pub delivery: DeliveryOptions,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Delivery loops of open sessions, drained on shutdown.
    pub sessions: TaskTracker,
}

/// The real-time delivery server.
pub struct SceneeServer {
    settings: SceneeSettings,
    registry: Arc<ConnectionRegistry>,
    broadcaster: EventBroadcaster,
    identity: Arc<dyn IdentityResolver>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    sessions: TaskTracker,
    start_time: Instant,
}

impl SceneeServer {
    /// Create a server from loaded settings.
    pub fn new(
        settings: SceneeSettings,
        identity: Arc<dyn IdentityResolver>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ConnectionRegistry::new(
            settings.realtime.queue_capacity,
            shutdown.token(),
        ));
        let broadcaster = EventBroadcaster::new(Arc::clone(&registry));
        Self {
            settings,
            registry,
            broadcaster,
            identity,
            shutdown,
            metrics,
            sessions: TaskTracker::new(),
            start_time: Instant::now(),
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            identity: Arc::clone(&self.identity),
            delivery: DeliveryOptions::from(&self.settings.realtime),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            sessions: self.sessions.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/events", get(events_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve on `listener` until shutdown fires.
    ///
    /// Shutdown closes every session, which ends each open stream, so the
    /// graceful drain does not wait on clients. Returns once every session's
    /// teardown has finished (or the drain timed out).
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        info!(%addr, "scenee server listening");
        let token = self.shutdown.token();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        let drained = self.shutdown.drain(&self.sessions, None).await;
        info!(drained, "scenee server stopped");
        served?;
        Ok(())
    }

    /// Publisher handle for domain events.
    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// The session registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Delivery loops currently running.
    pub fn sessions(&self) -> &TaskTracker {
        &self.sessions
    }

    /// Settings the server was built with.
    pub fn settings(&self) -> &SceneeSettings {
        &self.settings
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.as_ref().map(metrics::render).unwrap_or_default()
}
