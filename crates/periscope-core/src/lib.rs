//! # periscope-core
//!
//! Foundation types and in-memory state for the periscope sidecar.
//!
//! - **Data model**: [`Session`], [`MessageInfo`], [`TokenUsage`], [`ToolPart`],
//!   [`ErrorObservation`]
//! - **Normalization**: [`normalize::normalize_event`] turns raw stream frames
//!   (flat or nested under `info`) into a [`NormalizedEvent`]
//! - **Bounded state**: [`DedupLedger`], [`EntityRegistry`], [`ErrorBuffer`]
//! - **Backoff**: reconnect delay math in [`backoff`]
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors_buffer;
pub mod ledger;
pub mod logging;
pub mod normalize;
pub mod registry;
pub mod text;
pub mod types;

pub use backoff::BackoffConfig;
pub use errors_buffer::ErrorBuffer;
pub use ledger::DedupLedger;
pub use normalize::NormalizedEvent;
pub use registry::EntityRegistry;
pub use types::*;
