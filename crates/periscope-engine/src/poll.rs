//! Periodic re-poll.
//!
//! Some providers never emit a completion event on the stream, so their
//! finished messages only show up in the session snapshots. The poll task
//! re-reads them on a fixed period, independent of the stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::Engine;

/// Spawn the re-poll loop. The first pass runs one `period` after spawning.
///
/// Failures never escape the task: they are logged at `warn` in verbose mode
/// and at `debug` otherwise. The task exits when `cancel` fires, abandoning
/// any in-flight pass.
pub fn spawn_poll_task(engine: Arc<Engine>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                result = engine.poll_once() => match result {
                    Ok(report) => debug!(
                        sessions = report.sessions,
                        new_sessions = report.new_sessions,
                        messages = report.messages_counted,
                        "poll complete"
                    ),
                    Err(e) if engine.config().verbose => warn!(error = %e, "poll failed"),
                    Err(e) => debug!(error = %e, "poll failed"),
                },
            }
        }
        debug!("poll task stopped");
    })
}
