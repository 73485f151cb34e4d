//! Connection-cycle errors.

use periscope_client::ClientError;
use thiserror::Error;

/// Why a connect-and-listen cycle ended.
///
/// Every variant is a transport-level failure: the supervisor records it and
/// reconnects after a backoff delay.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Health probe, snapshot fetch, or stream read failed.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The server answered the health probe but reported itself unhealthy.
    #[error("server reported unhealthy (version {version:?})")]
    Unhealthy {
        /// Version string from the health response.
        version: String,
    },
    /// The event stream closed. The server is expected to stream
    /// indefinitely while healthy.
    #[error("event stream ended")]
    StreamEnded,
}
