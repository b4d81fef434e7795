//! Error types for git-pipeline
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for git-pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command runner errors
///
/// These never cross the worker/handler boundary as `Err`: the runner turns
/// them into an `Outcome::Failed` or an alert before delivery.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("{binary} binary could not be found in PATH")]
    ExecutableNotFound { binary: String },

    #[error("Empty argument vector")]
    EmptyCommand,

    #[error("Failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Main loop is no longer running")]
    DispatchClosed,
}

/// Diff parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("No hunk info")]
    NoHunkInfo,

    #[error("No file header above hunk")]
    NoFileHeader,

    #[error("Malformed hunk header at line {line}: {header}")]
    MalformedHeader { line: usize, header: String },

    #[error("Git reported an error: {0}")]
    GitError(String),

    #[error("Not inside a git repository: {0}")]
    NotInRepository(PathBuf),

    #[error("Failed to prepare scratch files: {0}")]
    Scratch(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to create config directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
