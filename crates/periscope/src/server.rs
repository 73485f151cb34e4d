//! Prometheus exporter: `GET /metrics` and `GET /health`, plus the periodic
//! upkeep task that refreshes info gauges between scrapes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use periscope_engine::{Engine, PrometheusSink};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Prometheus text exposition content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for exporter handlers.
#[derive(Clone)]
pub struct ExporterState {
    /// Renders recorder series and info gauges.
    pub sink: Arc<PrometheusSink>,
    /// Source of connection status for `/health`.
    pub engine: Arc<Engine>,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthBody {
    /// Always `"ok"` while the exporter is serving.
    pub status: &'static str,
    /// Whether the observed server passed its last health check.
    pub upstream_up: bool,
    /// Registered sessions.
    pub sessions: usize,
    /// Consecutive failed connection attempts.
    pub reconnect_attempt: u32,
}

/// Build the exporter router.
pub fn router(state: ExporterState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind `addr` and serve until `cancel` fires.
///
/// Returns the bound address (useful when `addr` asks for port 0).
pub async fn start_exporter(
    addr: &str,
    state: ExporterState,
    cancel: CancellationToken,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let app = router(state);

    let handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await;
        if let Err(e) = served {
            error!(error = %e, "metrics server failed");
        }
        info!("metrics server stopped");
    });
    Ok((local_addr, handle))
}

/// Publish snapshot gauges and run recorder upkeep every `interval`.
pub fn spawn_upkeep_task(
    engine: Arc<Engine>,
    sink: Arc<PrometheusSink>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    engine.emit_snapshots();
                    sink.run_upkeep();
                    let stats = engine.stats();
                    debug!(
                        sessions = stats.sessions,
                        ledger_keys = stats.ledger_keys,
                        errors = stats.errors,
                        up = stats.up,
                        "snapshot exported"
                    );
                }
            }
        }
    })
}

/// GET /metrics
async fn metrics_handler(State(state): State<ExporterState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.sink.render())
}

/// GET /health
async fn health_handler(State(state): State<ExporterState>) -> Json<HealthBody> {
    let stats = state.engine.stats();
    Json(HealthBody {
        status: "ok",
        upstream_up: stats.up,
        sessions: stats.sessions,
        reconnect_attempt: stats.attempt,
    })
}
