//! Error types for the relocation orchestrator

use crate::models::{StageErrorKind, StageFailure, StageId};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Run failed: {0}")]
    RunFailed(RunError),

    #[error("Aggregation internal error: {0}")]
    AggregationInternal(String),

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::Validation(_) => "validation_error",
            OrchestrationError::Configuration(_) => "configuration_error",
            OrchestrationError::RunFailed(_) => "run_error",
            OrchestrationError::AggregationInternal(_) => "aggregation_internal_error",
            OrchestrationError::Cancelled(_) => "cancelled_error",
            OrchestrationError::SerializationError(_) => "serialization_error",
            OrchestrationError::HttpError(_) => "http_error",
            OrchestrationError::IoError(_) => "io_error",
        }
    }
}

/// A required stage failed; lists every failed stage of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunError {
    pub failed_stages: Vec<FailedStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedStage {
    pub stage: StageId,
    pub kind: StageErrorKind,
    pub message: String,
}

impl RunError {
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.failed_stages.iter().map(|f| f.stage.as_str()).collect()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .failed_stages
            .iter()
            .map(|s| format!("{} ({}: {})", s.stage, s.kind, s.message))
            .collect();
        write!(f, "failed stages: {}", parts.join(", "))
    }
}

impl From<RunError> for OrchestrationError {
    fn from(err: RunError) -> Self {
        OrchestrationError::RunFailed(err)
    }
}

/// Failure of an upstream data provider lookup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: &'static str, message: String },

    #[error("{provider} timed out after {timeout_ms} ms")]
    Timeout { provider: &'static str, timeout_ms: u64 },

    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse { provider: &'static str, message: String },

    #[error("{provider} has no data for location '{location}'")]
    UnknownLocation { provider: &'static str, location: String },
}

impl From<ProviderError> for StageFailure {
    fn from(err: ProviderError) -> Self {
        StageFailure::new(StageErrorKind::Provider, err.to_string())
    }
}
