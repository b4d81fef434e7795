//! Unified diff parsing
//!
//! - `annotate::parse` - Per-line change markers for gutter annotations
//! - `patch` - Hunk selection for partial staging
//! - `locate` - Diff row to file position

pub mod annotate;
mod hunk;
mod locate;
mod patch;

pub use annotate::{ChangeKind, LineClassification};
pub use hunk::*;
pub use locate::*;
pub use patch::*;
