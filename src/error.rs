//! Error types for Feedpulse

use thiserror::Error;

/// Errors that can occur outside the total metric and feature computations
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse session payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to read configuration: {0}")]
    ConfigError(String),

    #[error("Prediction model unavailable")]
    ModelUnavailable,

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Classification failed for session {session_id}: {reason}")]
    ClassificationFailed { session_id: String, reason: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Analysis cancelled for session {0}")]
    AnalysisCancelled(String),

    #[error("Scheduler cannot start: {0}")]
    SchedulerUnavailable(String),
}
