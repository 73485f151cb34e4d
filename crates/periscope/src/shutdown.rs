//! Two-phase shutdown.
//!
//! Workers (supervisor and upkeep) stop first. The final snapshot is then
//! published while the exporter is still serving, and only after that is
//! the exporter told to drain. One deadline bounds the whole sequence.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancellation for the sidecar's tasks.
///
/// The worker token is a child of the exporter token: cancelling the
/// exporter stops everything, cancelling the workers leaves `/metrics` up.
pub struct ShutdownSequence {
    exporter: CancellationToken,
    workers: CancellationToken,
}

impl ShutdownSequence {
    pub fn new() -> Self {
        let exporter = CancellationToken::new();
        let workers = exporter.child_token();
        Self { exporter, workers }
    }

    /// Token for the supervisor and the upkeep task.
    pub fn worker_token(&self) -> CancellationToken {
        self.workers.clone()
    }

    /// Token for the metrics server.
    pub fn exporter_token(&self) -> CancellationToken {
        self.exporter.clone()
    }

    /// Stop workers, run `final_snapshot`, then stop the exporter.
    ///
    /// Tasks still running when `timeout` elapses are left behind.
    /// `final_snapshot` runs regardless.
    pub async fn run<F>(
        self,
        workers: Vec<JoinHandle<()>>,
        exporter: JoinHandle<()>,
        timeout: Duration,
        final_snapshot: F,
    ) where
        F: FnOnce(),
    {
        let deadline = Instant::now() + timeout;

        self.workers.cancel();
        info!(task_count = workers.len(), "stopping workers");
        if tokio::time::timeout_at(deadline, futures::future::join_all(workers)).await.is_err() {
            warn!("workers still running after {timeout:?}");
        }

        final_snapshot();
        info!("final snapshot published");

        self.exporter.cancel();
        if tokio::time::timeout_at(deadline, exporter).await.is_err() {
            warn!("metrics server still draining after {timeout:?}");
        }
    }
}

impl Default for ShutdownSequence {
    fn default() -> Self {
        Self::new()
    }
}
