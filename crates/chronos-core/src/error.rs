//! Core error types for chronos-core.
//!
//! Every concern gets its own thiserror enum; [`CoreError`] wraps them for
//! callers that just want one type to bubble up.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for chronos-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Cycle engine and store errors
    #[error("Cycle error: {0}")]
    Cycle(#[from] CycleError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while running or persisting a focus/break cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    /// A store request failed (transport, database or malformed response).
    #[error("Store request '{operation}' failed: {message}")]
    NetworkFailure { operation: String, message: String },

    /// The loader found no cycle for the activity. Rendered as idle.
    #[error("No active cycle for activity {activity_id}")]
    NoActiveCycle { activity_id: String },

    /// A planned session is outside the allowed duration range.
    #[error("Invalid {field} duration {minutes}m (allowed {min}..={max})")]
    InvalidSessionConfig {
        field: String,
        minutes: u32,
        min: u32,
        max: u32,
    },

    /// An async response refers to an engine epoch that was already superseded.
    #[error("Stale response for epoch {epoch}")]
    StaleResponse { epoch: u64 },

    /// The cycle id is unknown to the store.
    #[error("Cycle not found: {0}")]
    CycleNotFound(String),

    /// The requested operation does not apply to the record's status.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl CycleError {
    /// Wrap any displayable failure as a store failure for `operation`.
    pub fn network(operation: &str, err: impl std::fmt::Display) -> Self {
        CycleError::NetworkFailure {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this error only means "nothing to show".
    pub fn is_idle(&self) -> bool {
        matches!(self, CycleError::NoActiveCycle { .. })
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home or data directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time window: end minute ({end}) must not precede start minute ({start})")]
    InvalidWindow { start: u32, end: u32 },
}

impl From<rusqlite::Error> for CycleError {
    fn from(err: rusqlite::Error) -> Self {
        CycleError::network("sqlite", err)
    }
}

impl From<reqwest::Error> for CycleError {
    fn from(err: reqwest::Error) -> Self {
        let operation = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "http".to_string());
        CycleError::network(&operation, err)
    }
}

impl From<serde_json::Error> for CycleError {
    fn from(err: serde_json::Error) -> Self {
        CycleError::network("decode", err)
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
