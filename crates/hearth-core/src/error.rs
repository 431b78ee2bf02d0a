//! Core error types for hearth-core.
//!
//! Every rejected mutation leaves household state exactly as it was before
//! the call; errors here are reporting, never partial application.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for hearth-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed rule or chore configuration, rejected at definition time
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Acting user lacks the capability for the requested transition
    #[error("User '{actor}' is not authorized to {action}")]
    Authorization { actor: String, action: String },

    /// The requested transition is not legal from the current state
    #[error("Invalid transition: cannot {action} an assignment in state '{from}'")]
    InvalidTransition { from: String, action: String },

    /// Unknown entity id
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot load/migration errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// The household service has shut down and accepts no more commands
    #[error("Household service unavailable")]
    ServiceUnavailable,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validation errors raised when a chore or rule definition is rejected.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid field value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Policy combination that the engine cannot honor
    #[error("Unsupported policy combination: {0}")]
    PolicyConflict(String),

    /// Per-user override maps are only meaningful for independent chores
    #[error("Chore '{chore}' has per-user overrides but criteria '{criteria}'")]
    OverridesOnSharedChore { chore: String, criteria: String },

    /// Invalid time window
    #[error("Invalid window: end ({end}) must be after start ({start})")]
    InvalidWindow {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Empty collection where at least one element is required
    #[error("Empty collection: {0}")]
    EmptyCollection(String),
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

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
