//! Error types for the codecoach core library.
//!
//! Uses `thiserror` for public API error types. Only the I/O edges (config,
//! notebook loading, experiment storage) and the run lifecycle can fail;
//! matchers, extractors, hint selection and scoring are infallible.

use std::path::PathBuf;

use crate::activity::ActivityId;

/// Top-level error type for the codecoach core library.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notebook error: {0}")]
    Notebook(#[from] NotebookError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Unknown activity: {name}")]
    UnknownActivity { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors from experiment persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open experiment store at {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored experiment {id} is corrupt: {message}")]
    Corrupt { id: String, message: String },

    #[error("Experiment store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Experiment serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from loading notebook documents.
#[derive(Debug, thiserror::Error)]
pub enum NotebookError {
    #[error("Failed to read notebook {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Malformed notebook: {message}")]
    Malformed { message: String },
}

/// Errors from the notebook session lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A run is already in flight for activity {activity}")]
    RunInFlight { activity: ActivityId },

    #[error("No run is in flight for activity {activity}")]
    NoRunInFlight { activity: ActivityId },
}

/// A type alias for results using the top-level `CoachError`.
pub type Result<T> = std::result::Result<T, CoachError>;
