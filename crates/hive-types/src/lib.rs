//! Shared types, errors, and artifact sets for the Hive generation pipeline.
//!
//! This crate provides the foundational types used across all other Hive crates:
//! - `HiveError` — unified error taxonomy, with [`ErrorKind`] for reporting
//! - `ArtifactSet` — ordered, fully-populated map of generated files
//! - `ComplexityProfile` — classifier output that drives strategy selection
//! - `StageAttempt` / `StageResult` / `PipelineResult` — run history and report

mod artifact;
mod pipeline;
mod profile;
mod stage;
mod text;

pub use artifact::{Artifact, ArtifactSet, FileOutcome, FileStatus};
pub use pipeline::{OverallStatus, PipelineResult, PipelineSummary, StageSummary};
pub use profile::{ComplexityLevel, ComplexityProfile, GenerationStrategy};
pub use stage::{
    AttemptOutcome, DegradationLevel, InputVariant, StageAttempt, StageResult, StageStatus,
};
pub use text::{truncate_chars, truncate_with_marker};

use serde::{Deserialize, Serialize};

/// Unified error type for all Hive subsystems.
#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    // === Generative Service Transport Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    // === Generation Errors ===
    #[error("Generation call for '{target}' failed: {message}")]
    GenerationCallFailed { target: String, message: String },

    #[error(
        "Unrecoverable output: {parse_error} (candidate length {candidate_len}, starts with: {snippet})"
    )]
    UnrecoverableOutput {
        parse_error: String,
        candidate_len: usize,
        snippet: String,
    },

    #[error("Stage '{stage}' is missing expected keys: {}", missing.join(", "))]
    IncompleteArtifactSet { stage: String, missing: Vec<String> },

    #[error("Stage '{stage}' exhausted {attempts} attempts; last error: {last_error}")]
    StageExhausted {
        stage: String,
        attempts: usize,
        last_error: String,
    },

    // === Configuration & Output ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact key '{key}' does not map to a safe relative path")]
    UnsafePath { key: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Reporting category for a [`HiveError`], recorded next to each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    MalformedOutput,
    IncompleteArtifactSet,
    GenerationFailed,
    StageExhausted,
    Other,
}

impl HiveError {
    /// Returns `true` for network-level failures of the generative service.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HiveError::ProviderError { .. }
                | HiveError::RateLimited { .. }
                | HiveError::AuthError { .. }
                | HiveError::RequestTimeout { .. }
        )
    }

    /// Returns `true` if the same request may succeed when simply sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HiveError::RateLimited { .. }
                | HiveError::RequestTimeout { .. }
                | HiveError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Maps the error onto the reporting taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            e if e.is_transport() => ErrorKind::Transport,
            HiveError::UnrecoverableOutput { .. } | HiveError::Json(_) => {
                ErrorKind::MalformedOutput
            }
            HiveError::IncompleteArtifactSet { .. } => ErrorKind::IncompleteArtifactSet,
            HiveError::GenerationCallFailed { .. } => ErrorKind::GenerationFailed,
            HiveError::StageExhausted { .. } => ErrorKind::StageExhausted,
            _ => ErrorKind::Other,
        }
    }
}

/// A convenience alias for `Result<T, HiveError>`.
pub type Result<T> = std::result::Result<T, HiveError>;
