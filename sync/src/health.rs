//! Health check and metrics HTTP server
//!
//! Endpoints:
//! - GET /health - Liveness probe (always returns 200 if server is running)
//! - GET /ready - Readiness probe (200 only while both contracts are operational)
//! - GET /metrics - Prometheus-compatible metrics
//! - GET /status - JSON view of account, contracts and status
//! - GET /logs - JSON transaction log

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::{SyncView, Synchronizer};
use crate::types::{OperationalStatus, TransactionLogEntry};

/// Health server state shared across handlers
pub struct HealthState {
    /// Service start time for uptime calculation
    pub start_time: Instant,

    pub sync: Arc<Synchronizer>,
}

impl HealthState {
    pub fn new(sync: Arc<Synchronizer>) -> Self {
        Self {
            start_time: Instant::now(),
            sync,
        }
    }
}

/// Liveness response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Readiness response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub provider_connected: bool,
    pub account_present: bool,
    pub status: OperationalStatus,
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn ready_handler(State(state): State<Arc<HealthState>>) -> Response {
    let view = state.sync.view().await;

    let response = ReadyResponse {
        ready: view.status == OperationalStatus::Active,
        provider_connected: view.connected,
        account_present: view.account.is_present(),
        status: view.status,
    };

    if response.ready {
        (StatusCode::OK, Json(response)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
    }
}

/// Metrics handler - Prometheus format
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> String {
    let view = state.sync.view().await;
    let stats = &view.stats;
    let uptime = state.start_time.elapsed().as_secs();

    format!(
        r#"# HELP surety_sync_operational_status Composite status (0=disconnected, 1=paused, 2=active)
# TYPE surety_sync_operational_status gauge
surety_sync_operational_status {}

# HELP surety_sync_provider_connected Whether a wallet provider is attached
# TYPE surety_sync_provider_connected gauge
surety_sync_provider_connected {}

# HELP surety_sync_account_changes_total Published account changes
# TYPE surety_sync_account_changes_total counter
surety_sync_account_changes_total {}

# HELP surety_sync_status_recomputations_total Status recomputations by outcome
# TYPE surety_sync_status_recomputations_total counter
surety_sync_status_recomputations_total{{outcome="changed"}} {}
surety_sync_status_recomputations_total{{outcome="unchanged"}} {}

# HELP surety_sync_log_entries_total Transaction log entries recorded
# TYPE surety_sync_log_entries_total counter
surety_sync_log_entries_total {}

# HELP surety_sync_log_subscription_failures_total Log subscriptions that failed
# TYPE surety_sync_log_subscription_failures_total counter
surety_sync_log_subscription_failures_total {}

# HELP surety_sync_remote_call_failures_total Failed provider or contract calls
# TYPE surety_sync_remote_call_failures_total counter
surety_sync_remote_call_failures_total {}

# HELP surety_sync_uptime_seconds Service uptime in seconds
# TYPE surety_sync_uptime_seconds gauge
surety_sync_uptime_seconds {}
"#,
        view.status.as_metric(),
        u8::from(view.connected),
        stats.account_changes,
        stats.status_changes,
        stats.status_recomputations - stats.status_changes,
        stats.log_entries,
        stats.log_subscription_failures,
        stats.remote_call_failures,
        uptime,
    )
}

async fn status_handler(State(state): State<Arc<HealthState>>) -> Json<SyncView> {
    Json(state.sync.view().await)
}

async fn logs_handler(State(state): State<Arc<HealthState>>) -> Json<Vec<TransactionLogEntry>> {
    Json(state.sync.log_snapshot())
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .route("/logs", get(logs_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health server that runs alongside the synchronizer
pub struct HealthServer {
    state: Arc<HealthState>,
    port: u16,
}

impl HealthServer {
    pub fn new(sync: Arc<Synchronizer>, port: u16) -> Self {
        let state = Arc::new(HealthState::new(sync));
        Self { state, port }
    }

    pub fn state(&self) -> Arc<HealthState> {
        Arc::clone(&self.state)
    }

    /// Run the health server
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = create_router(Arc::clone(&self.state));

        info!(port = self.port, "Health server starting");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
