//! # periscope-engine
//!
//! Reconciliation of the observed server's event stream with periodic
//! snapshot polls.
//!
//! - [`Engine`]: owns the registry, dedup ledger, and error buffer; runs
//!   health check, backfill, and stream consumption
//! - [`poll`]: the periodic re-poll task
//! - [`supervisor`]: reconnect loop with exponential backoff
//! - [`sink`]: the [`MetricsSink`] seam with Prometheus and in-memory
//!   implementations
//! - [`metrics`]: metric name constants

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod metrics;
pub mod poll;
pub mod sink;
pub mod supervisor;

pub use engine::{Engine, EngineConfig, EngineStats, Source, SyncReport};
pub use errors::CycleError;
pub use sink::{Label, MemorySink, MetricsSink, PrometheusSink};
pub use supervisor::{run_supervisor, spawn_supervisor};
