//! git-pipeline - Async git command pipeline for editor integrations
//!
//! Runs git off the editor's main thread and turns its diff output into
//! per-line change markers.
//!
//! # Architecture
//!
//! - **CommandRunner** - Worker tasks that run one git process at a time,
//!   retrying while the index is locked
//! - **MainLoop** - The single context on which every result is delivered
//! - **Annotator** - Buffer-vs-HEAD diffs for gutter annotations
//!
//! # Modules
//!
//! - [`runner`] - Invocations, spawning, serialization and delivery
//! - [`diff`] - Hunk headers, line classification, hunk selection
//! - [`annotate`] - Live annotation workflow and cache
//! - [`repo`] - Repository root discovery
//! - [`config`] - Layered configuration
//! - [`error`] - Error types

pub mod annotate;
pub mod config;
pub mod diff;
pub mod error;
pub mod repo;
pub mod runner;

pub use annotate::{Annotations, Annotator};
pub use config::Config;
pub use diff::{ChangeKind, LineClassification};
pub use error::{Error, Result};
pub use runner::{CommandRunner, Invocation, MainContext, MainLoop, Outcome, main_loop};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
