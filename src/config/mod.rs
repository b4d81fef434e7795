//! Configuration module
//!
//! Handles user configuration (`config.toml` in the platform config dir)
//! layered with `GIT_PIPELINE_*` environment overrides.

mod settings;

pub use settings::*;
