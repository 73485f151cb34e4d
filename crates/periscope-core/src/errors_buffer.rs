//! Error ring buffer: a bounded, time-windowed log of recent errors.
//!
//! Entries are appended in capture order. The count cap is enforced on every
//! push; the retention window is enforced lazily, when the buffer is read.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::ErrorObservation;

/// Default maximum number of retained errors.
pub const DEFAULT_ERROR_CAPACITY: usize = 100;

/// Default retention window in seconds (1 hour).
pub const DEFAULT_ERROR_RETENTION_SECS: i64 = 3600;

/// Bounded FIFO of [`ErrorObservation`]s.
#[derive(Clone, Debug)]
pub struct ErrorBuffer {
    entries: VecDeque<ErrorObservation>,
    capacity: usize,
    retention: TimeDelta,
}

impl ErrorBuffer {
    /// Create a buffer with default capacity and retention.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_ERROR_CAPACITY, DEFAULT_ERROR_RETENTION_SECS)
    }

    /// Create a buffer with a custom count cap and retention window.
    pub fn with_limits(capacity: usize, retention_secs: i64) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            retention: TimeDelta::try_seconds(retention_secs.max(0)).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Append an observation, dropping the oldest entries beyond the cap.
    pub fn push(&mut self, observation: ErrorObservation) {
        self.entries.push_back(observation);
        while self.entries.len() > self.capacity {
            let _ = self.entries.pop_front();
        }
    }

    /// Drop entries older than the retention window. Returns how many were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let mut dropped = 0;
        while let Some(front) = self.entries.front() {
            if now.signed_duration_since(front.timestamp) <= self.retention {
                break;
            }
            let _ = self.entries.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Prune, then return the retained observations oldest-first.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> Vec<ErrorObservation> {
        let _ = self.prune(now);
        self.entries.iter().cloned().collect()
    }

    /// Number of retained entries (without pruning).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ErrorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn obs_at(ts: DateTime<Utc>, message: &str) -> ErrorObservation {
        ErrorObservation::at(ts, "connection", message, "test")
    }

    #[test]
    fn retained_just_inside_window() {
        let mut buf = ErrorBuffer::with_limits(100, 60);
        buf.push(obs_at(t0(), "e"));
        let snap = buf.snapshot(t0() + TimeDelta::seconds(59));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn dropped_just_outside_window() {
        let mut buf = ErrorBuffer::with_limits(100, 60);
        buf.push(obs_at(t0(), "e"));
        let snap = buf.snapshot(t0() + TimeDelta::seconds(61));
        assert!(snap.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn cap_keeps_most_recent() {
        let mut buf = ErrorBuffer::new();
        for i in 0..150 {
            buf.push(obs_at(t0(), &format!("e{i}")));
        }
        let snap = buf.snapshot(t0());
        assert_eq!(snap.len(), DEFAULT_ERROR_CAPACITY);
        assert_eq!(snap.first().unwrap().message, "e50");
        assert_eq!(snap.last().unwrap().message, "e149");
    }

    #[test]
    fn prune_stops_at_first_fresh_entry() {
        let mut buf = ErrorBuffer::with_limits(10, 60);
        buf.push(obs_at(t0(), "old"));
        buf.push(obs_at(t0() + TimeDelta::seconds(50), "fresh"));
        assert_eq!(buf.prune(t0() + TimeDelta::seconds(90)), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn full_message_retained_in_memory() {
        let mut buf = ErrorBuffer::new();
        let long = "x".repeat(1000);
        buf.push(obs_at(t0(), &long));
        assert_eq!(buf.snapshot(t0())[0].message.len(), 1000);
    }
}
