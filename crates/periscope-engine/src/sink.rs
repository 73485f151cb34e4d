//! # Metrics sinks
//!
//! The engine reports through [`MetricsSink`] so it never touches a global
//! recorder directly:
//! - [`PrometheusSink`] forwards to the process-wide `metrics` recorder and
//!   renders info gauges into the `/metrics` text
//! - [`MemorySink`] keeps totals in memory for tests and diagnostics

use std::collections::BTreeMap;
use std::fmt::Write as _;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;

/// A `(key, value)` label pair.
pub type Label = (&'static str, String);

/// Receiver of counter, up/down, and gauge updates.
pub trait MetricsSink: Send + Sync {
    /// Add `value` to a monotonic counter.
    fn add_counter(&self, name: &'static str, labels: &[Label], value: u64);

    /// Add `delta` (possibly negative) to an up/down counter.
    fn add_updown(&self, name: &'static str, labels: &[Label], delta: i64);

    /// Set a gauge to `value`.
    fn set_gauge(&self, name: &'static str, labels: &[Label], value: f64);

    /// Replace every row of an info gauge. Each row reports the value 1.
    fn publish_info(&self, name: &'static str, rows: Vec<Vec<Label>>);
}

// ─────────────────────────────────────────────────────────────────────────────
// Prometheus
// ─────────────────────────────────────────────────────────────────────────────

/// Sink backed by the global `metrics` recorder.
///
/// Info gauges are kept here rather than in the recorder because their row
/// set is replaced wholesale on every publish. A series that disappears from
/// the registry must disappear from `/metrics` too.
pub struct PrometheusSink {
    handle: PrometheusHandle,
    info: Mutex<BTreeMap<&'static str, Vec<Vec<Label>>>>,
}

impl PrometheusSink {
    /// Wrap the handle returned by the installed recorder.
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle,
            info: Mutex::new(BTreeMap::new()),
        }
    }

    /// Render the recorder's series followed by the info gauges.
    pub fn render(&self) -> String {
        let mut out = self.handle.render();
        let info = self.info.lock();
        for (name, rows) in info.iter() {
            if rows.is_empty() {
                continue;
            }
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            let _ = writeln!(out, "# TYPE {name} gauge");
            for row in rows {
                let labels = row
                    .iter()
                    .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                let _ = writeln!(out, "{name}{{{labels}}} 1");
            }
        }
        out
    }

    /// Drain histogram buckets and other recorder housekeeping.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }
}

impl MetricsSink for PrometheusSink {
    fn add_counter(&self, name: &'static str, labels: &[Label], value: u64) {
        metrics::counter!(name, to_labels(labels)).increment(value);
    }

    #[allow(clippy::cast_precision_loss)]
    fn add_updown(&self, name: &'static str, labels: &[Label], delta: i64) {
        let gauge = metrics::gauge!(name, to_labels(labels));
        if delta >= 0 {
            gauge.increment(delta as f64);
        } else {
            gauge.decrement(delta.unsigned_abs() as f64);
        }
    }

    fn set_gauge(&self, name: &'static str, labels: &[Label], value: f64) {
        metrics::gauge!(name, to_labels(labels)).set(value);
    }

    fn publish_info(&self, name: &'static str, rows: Vec<Vec<Label>>) {
        let _ = self.info.lock().insert(name, rows);
    }
}

fn to_labels(labels: &[Label]) -> Vec<metrics::Label> {
    labels
        .iter()
        .map(|(k, v)| metrics::Label::new(*k, v.clone()))
        .collect()
}

/// Escape a label value for the Prometheus text format.
fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

type SeriesKey = (String, Vec<(String, String)>);

#[derive(Default)]
struct MemoryState {
    counters: BTreeMap<SeriesKey, u64>,
    updowns: BTreeMap<SeriesKey, i64>,
    gauges: BTreeMap<SeriesKey, f64>,
    info: BTreeMap<String, Vec<Vec<Label>>>,
}

/// Sink that accumulates everything in memory.
///
/// Queries take a label filter and match every series whose labels contain
/// all of the given pairs, so `counter(MESSAGES_TOTAL, &[("source", "live")])`
/// sums across models and providers.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of counter series matching `filter`.
    pub fn counter(&self, name: &str, filter: &[(&str, &str)]) -> u64 {
        let state = self.state.lock();
        state
            .counters
            .iter()
            .filter(|(key, _)| matches(key, name, filter))
            .map(|(_, v)| *v)
            .sum()
    }

    /// Sum of up/down series matching `filter`.
    pub fn updown(&self, name: &str, filter: &[(&str, &str)]) -> i64 {
        let state = self.state.lock();
        state
            .updowns
            .iter()
            .filter(|(key, _)| matches(key, name, filter))
            .map(|(_, v)| *v)
            .sum()
    }

    /// Value of the first gauge series matching `filter`.
    pub fn gauge(&self, name: &str, filter: &[(&str, &str)]) -> Option<f64> {
        let state = self.state.lock();
        state
            .gauges
            .iter()
            .find(|(key, _)| matches(key, name, filter))
            .map(|(_, v)| *v)
    }

    /// Rows most recently published for an info gauge.
    pub fn info_rows(&self, name: &str) -> Vec<Vec<Label>> {
        self.state.lock().info.get(name).cloned().unwrap_or_default()
    }
}

impl MetricsSink for MemorySink {
    fn add_counter(&self, name: &'static str, labels: &[Label], value: u64) {
        let mut state = self.state.lock();
        *state.counters.entry(series_key(name, labels)).or_insert(0) += value;
    }

    fn add_updown(&self, name: &'static str, labels: &[Label], delta: i64) {
        let mut state = self.state.lock();
        *state.updowns.entry(series_key(name, labels)).or_insert(0) += delta;
    }

    fn set_gauge(&self, name: &'static str, labels: &[Label], value: f64) {
        let _ = self.state.lock().gauges.insert(series_key(name, labels), value);
    }

    fn publish_info(&self, name: &'static str, rows: Vec<Vec<Label>>) {
        let _ = self.state.lock().info.insert(name.to_string(), rows);
    }
}

fn series_key(name: &str, labels: &[Label]) -> SeriesKey {
    let mut pairs: Vec<(String, String)> = labels.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
    pairs.sort();
    (name.to_string(), pairs)
}

fn matches(key: &SeriesKey, name: &str, filter: &[(&str, &str)]) -> bool {
    key.0 == name
        && filter
            .iter()
            .all(|(fk, fv)| key.1.iter().any(|(k, v)| k == fk && v == fv))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
