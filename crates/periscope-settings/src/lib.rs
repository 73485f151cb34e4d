//! # periscope-settings
//!
//! Configuration for the periscope sidecar, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`PeriscopeSettings::default()`]
//! 2. **Settings file**: `$PERISCOPE_CONFIG` or `~/.periscope/settings.json`
//! 3. **Environment variables**: `OPENCODE_URL` and `PERISCOPE_*` overrides
//!
//! The binary applies CLI flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
