use serde::{Deserialize, Serialize};

use crate::{ArtifactSet, ErrorKind, FileOutcome, GenerationStrategy};

// ---------------------------------------------------------------------------
// Requirement variants
// ---------------------------------------------------------------------------

/// Degradation rung applied to a requirement before a retry.
///
/// Each rung is strictly narrower in scope than the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Original text plus a note to prefer core behavior.
    Light = 1,
    /// Synthesized minimal description of entities and core features.
    Moderate = 2,
    /// Fewer entities and no advanced features.
    Minimal = 3,
}

impl DegradationLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            1 => Some(DegradationLevel::Light),
            2 => Some(DegradationLevel::Moderate),
            3 => Some(DegradationLevel::Minimal),
            _ => None,
        }
    }
}

/// Which form of the requirement an attempt was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "variant", content = "level", rename_all = "snake_case")]
pub enum InputVariant {
    Original,
    Degraded(DegradationLevel),
}

impl std::fmt::Display for InputVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputVariant::Original => write!(f, "original"),
            InputVariant::Degraded(level) => write!(f, "degraded(level={})", level.as_u8()),
        }
    }
}

// ---------------------------------------------------------------------------
// StageAttempt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One attempt of one stage. Created once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAttempt {
    /// 1-based.
    pub attempt_number: usize,
    pub input_variant: InputVariant,
    /// The requirement text actually handed to the stage function.
    pub input_text: String,
    pub outcome: AttemptOutcome,
    /// Truncated error message for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactSet>,
    /// Per-key outcomes reported by the generator on success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_log: Vec<FileOutcome>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StageAttempt {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    /// Never attempted: a prerequisite failed or the run was cancelled.
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Success => write!(f, "success"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Terminal outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub mandatory: bool,
    pub status: StageStatus,
    /// Empty unless `status` is `Success`.
    pub final_artifacts: ArtifactSet,
    pub history: Vec<StageAttempt>,
    /// Generation mode of the last attempt; empty for skipped stages.
    pub strategy_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl StageResult {
    /// A stage that was never attempted.
    pub fn skipped(stage: impl Into<String>, mandatory: bool, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            mandatory,
            status: StageStatus::Skipped,
            final_artifacts: ArtifactSet::new(),
            history: Vec::new(),
            strategy_used: String::new(),
            last_error: None,
            skip_reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub fn attempts(&self) -> usize {
        self.history.len()
    }

    /// Strategy recorded on the attempt history, parsed back into the enum.
    pub fn strategy(&self) -> Option<GenerationStrategy> {
        self.strategy_used.parse().ok()
    }
}
