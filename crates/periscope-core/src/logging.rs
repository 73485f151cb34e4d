//! Logging setup.
//!
//! Uses the `tracing` ecosystem for structured logs. `RUST_LOG` takes
//! precedence over the level passed in, so operators can raise verbosity per
//! module without touching configuration.

use tracing_subscriber::EnvFilter;

/// Log level used when verbose mode is on.
pub const VERBOSE_LEVEL: &str = "debug";

/// Log level used otherwise.
pub const DEFAULT_LEVEL: &str = "info";

/// Output format for the stderr subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable compact lines.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Pick the filter level for the verbose toggle.
pub fn level_for(verbose: bool) -> &'static str {
    if verbose { VERBOSE_LEVEL } else { DEFAULT_LEVEL }
}

/// Initialize the global tracing subscriber writing to stderr.
///
/// Call once at startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
