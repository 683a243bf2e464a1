//! HTTP server for health, recent-window and metrics endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use k2r_core::cache::{CacheHealth, ListStore, RecentWindow};
use k2r_core::health::{ComponentStatus, HealthCheck, HealthStatus};
use k2r_core::metrics::PipelineMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shared state for HTTP endpoints.
pub struct ServerState<L: ListStore> {
    pub health: Arc<HealthCheck>,
    pub metrics: Arc<PipelineMetrics>,
    pub window: Arc<RecentWindow<L>>,
    pub display_count: usize,
}

/// Health response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub loop_running: bool,
    pub components: HashMap<String, ComponentStatusResponse>,
}

/// Component status response.
#[derive(Debug, Serialize)]
pub struct ComponentStatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&ComponentStatus> for ComponentStatusResponse {
    fn from(status: &ComponentStatus) -> Self {
        match status {
            ComponentStatus::Healthy => ComponentStatusResponse {
                status: "healthy".to_string(),
                message: None,
            },
            ComponentStatus::Degraded(msg) => ComponentStatusResponse {
                status: "degraded".to_string(),
                message: Some(msg.clone()),
            },
            ComponentStatus::Unhealthy(msg) => ComponentStatusResponse {
                status: "unhealthy".to_string(),
                message: Some(msg.clone()),
            },
            ComponentStatus::Unknown => ComponentStatusResponse {
                status: "unknown".to_string(),
                message: None,
            },
        }
    }
}

/// Query string of `/recent`.
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub count: Option<usize>,
}

/// Window contents, newest first.
#[derive(Debug, Serialize)]
pub struct RecentResponse {
    pub key: String,
    pub capacity: usize,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub items: Vec<String>,
}

/// Build the health-port router.
pub fn health_router<L: ListStore + 'static>(state: Arc<ServerState<L>>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<L>))
        .route("/healthz", get(healthz_handler::<L>))
        .route("/readyz", get(readyz_handler::<L>))
        .route("/recent", get(recent_handler::<L>))
        .with_state(state)
}

/// Build the metrics-port router.
pub fn metrics_router<L: ListStore + 'static>(state: Arc<ServerState<L>>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler::<L>))
        .with_state(state)
}

/// Serve both ports until `shutdown` is cancelled.
pub async fn start_server<L: ListStore + 'static>(
    state: Arc<ServerState<L>>,
    health_port: u16,
    metrics_port: u16,
    shutdown: CancellationToken,
) {
    let health_addr = SocketAddr::from(([0, 0, 0, 0], health_port));
    let health_listener = match tokio::net::TcpListener::bind(health_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port = health_port, "Failed to bind health server");
            return;
        }
    };

    info!(port = health_port, "Health server started");

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], metrics_port));
    let metrics_listener = match tokio::net::TcpListener::bind(metrics_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port = metrics_port, "Failed to bind metrics server");
            return;
        }
    };

    info!(port = metrics_port, "Metrics server started");

    let health_shutdown = shutdown.clone();
    let health_server = async {
        axum::serve(health_listener, health_router(Arc::clone(&state)))
            .with_graceful_shutdown(async move { health_shutdown.cancelled().await })
            .await
            .map_err(|e| error!(error = %e, "Health server error"))
    };

    let metrics_shutdown = shutdown.clone();
    let metrics_server = async {
        axum::serve(metrics_listener, metrics_router(Arc::clone(&state)))
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await
            .map_err(|e| error!(error = %e, "Metrics server error"))
    };

    let _ = tokio::join!(health_server, metrics_server);
    info!("HTTP servers shut down");
}

/// Health endpoint handler.
async fn health_handler<L: ListStore>(
    State(state): State<Arc<ServerState<L>>>,
) -> impl IntoResponse {
    let overall = state.health.overall_status();
    let components = state
        .health
        .get_all_statuses()
        .iter()
        .map(|(k, v)| (k.clone(), ComponentStatusResponse::from(v)))
        .collect();

    let status_str = match overall {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    };

    let response = HealthResponse {
        status: status_str.to_string(),
        loop_running: state.health.is_loop_running(),
        components,
    };

    let status_code = match overall {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Liveness probe handler.
async fn healthz_handler<L: ListStore>(
    State(state): State<Arc<ServerState<L>>>,
) -> impl IntoResponse {
    if state.health.overall_status() != HealthStatus::Unhealthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Readiness probe handler. A degraded cache still counts as ready.
async fn readyz_handler<L: ListStore>(
    State(state): State<Arc<ServerState<L>>>,
) -> impl IntoResponse {
    if state.health.is_loop_running() && state.health.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Recent-window read handler.
async fn recent_handler<L: ListStore>(
    State(state): State<Arc<ServerState<L>>>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    let count = query.count.unwrap_or(state.display_count);
    let items = state
        .window
        .recent(count)
        .await
        .iter()
        .map(|item| String::from_utf8_lossy(item).into_owned())
        .collect();
    state.metrics.record_read();

    let (healthy, reason) = match state.window.health() {
        CacheHealth::Healthy => (true, None),
        CacheHealth::Degraded(reason) => (false, Some(reason)),
    };

    Json(RecentResponse {
        key: state.window.key().to_string(),
        capacity: state.window.capacity(),
        healthy,
        reason,
        items,
    })
}

/// Prometheus metrics endpoint handler.
async fn metrics_handler<L: ListStore>(
    State(state): State<Arc<ServerState<L>>>,
) -> impl IntoResponse {
    match state.metrics.export_prometheus_text() {
        Ok(output) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            output,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}
