//! Health check endpoints
//!
//! `/health` answers while the process is up, `/ready` once the lifecycle is
//! running with at least one ready shard, `/metrics` in Prometheus format.

use crate::error::GatewayError;
use crate::lifecycle::{Lifecycle, LifecycleStatus, ShutdownTrigger, StartupPhase};
use crate::metrics::GatewayMetrics;
use crate::shard::ShardState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub phase: StartupPhase,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub phase: StartupPhase,
    pub shards_total: usize,
    pub shards_ready: usize,
    pub guilds_total: u64,
    pub modules_enabled: usize,
    pub modules_failed: usize,
}

/// Application state for health endpoints
#[derive(Clone)]
pub struct AppState {
    pub status: watch::Receiver<LifecycleStatus>,
    pub shard_state: Option<ShardState>,
    pub metrics: GatewayMetrics,
}

/// Create the health check router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the endpoints of a running lifecycle in the background
///
/// When `addr` cannot be bound the lifecycle is shut down before the error
/// is returned.
pub async fn serve(
    lifecycle: &mut Lifecycle,
    metrics: GatewayMetrics,
    addr: SocketAddr,
) -> Result<JoinHandle<()>, GatewayError> {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(source) => {
            error!(%addr, error = %source, "Health server bind failed, shutting down");
            match lifecycle.shutdown(ShutdownTrigger::Operator).await {
                Ok(report) => {
                    for step in report.failures() {
                        warn!(subsystem = step.subsystem, outcome = ?step.outcome, "Teardown step failed");
                    }
                }
                Err(violation) => warn!(error = %violation, "Health server bind failed before start"),
            }
            return Err(GatewayError::HealthBind { addr, source });
        }
    };

    let state = AppState {
        status: lifecycle.status(),
        shard_state: lifecycle.shard_state(),
        metrics,
    };

    info!(%addr, "Starting HTTP server");
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            error!(error = %e, "HTTP server error");
        }
    }))
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        phase: state.status.borrow().phase,
    })
}

/// Readiness endpoint - returns 200 once running with at least one ready shard
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.borrow().clone();
    let (shards_total, shards_ready, guilds_total) = state
        .shard_state
        .as_ref()
        .map(|s| (s.shard_count(), s.ready_shards(), s.total_guilds()))
        .unwrap_or_default();

    let is_ready = status.phase == StartupPhase::Running && shards_ready > 0;

    let response = ReadyResponse {
        ready: is_ready,
        phase: status.phase,
        shards_total,
        shards_ready,
        guilds_total,
        modules_enabled: status.modules.enabled,
        modules_failed: status.modules.failed,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(shards) = &state.shard_state {
        state.metrics.set_shards_ready(shards.ready_shards());
    }

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
