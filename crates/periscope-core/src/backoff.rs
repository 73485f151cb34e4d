//! Reconnect backoff configuration and delay calculation.
//!
//! The supervisor in `periscope-engine` owns the async retry loop. This
//! module holds the sync-only building blocks:
//!
//! - [`BackoffConfig`]: base and cap for the exponential delay
//! - [`calculate_backoff_delay`]: `min(base * 2^attempt, cap)`
//!
//! There is no attempt limit. The exponent keeps growing while the delay
//! stays capped.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Exponential backoff parameters for reconnecting to the observed server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Base delay for exponential backoff in ms (default: 1000).
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms (default: 60000).
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl BackoffConfig {
    /// Delay before the retry that follows failure number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
        ))
    }
}

/// Calculate an exponential backoff delay in milliseconds.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)`. The shift saturates at
/// `2^31` and the multiplication saturates at `u64::MAX`, so any attempt
/// number is safe.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
