//! # periscope-client
//!
//! Read-only access to the observed server:
//!
//! - [`OpencodeClient`]: `GET /global/health`, `GET /session`,
//!   `GET /session/{id}/message`, and the `GET /event` stream
//! - [`sse::frame_sse_data`]: incremental line framer that turns a chunked
//!   byte stream into `data:` payloads
//!
//! The client holds no state beyond its connection pool. Payloads are
//! returned as raw JSON; shape resolution happens in `periscope-core`.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod sse;

pub use client::{EventFrames, HealthResponse, OpencodeClient};
pub use errors::{ClientError, Result};
