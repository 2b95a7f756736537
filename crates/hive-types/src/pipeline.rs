use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ComplexityProfile, Result, StageResult, StageStatus};

// ---------------------------------------------------------------------------
// OverallStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every mandatory stage succeeded and no optional stage failed or was skipped.
    Complete,
    /// At least one stage succeeded, but not everything did.
    Partial,
    /// No stage produced anything.
    Failed,
}

impl OverallStatus {
    /// Derive the run status from terminal stage results.
    pub fn derive<'a>(stages: impl IntoIterator<Item = &'a StageResult>) -> Self {
        let mut any_success = false;
        let mut all_good = true;
        let mut any = false;
        for stage in stages {
            any = true;
            match stage.status {
                StageStatus::Success => any_success = true,
                StageStatus::Failed | StageStatus::Skipped => all_good = false,
            }
        }
        if !any || !any_success {
            OverallStatus::Failed
        } else if all_good {
            OverallStatus::Complete
        } else {
            OverallStatus::Partial
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Complete => write!(f, "complete"),
            OverallStatus::Partial => write!(f, "partial"),
            OverallStatus::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineSummary
// ---------------------------------------------------------------------------

/// Per-stage counters. Placeholders count toward `placeholders`, not `files`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub status: Option<StageStatus>,
    pub attempts: usize,
    pub files: usize,
    pub placeholders: usize,
    pub bytes: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub stages: IndexMap<String, StageSummary>,
    pub total_files: usize,
    pub total_bytes: usize,
    pub total_lines: usize,
    pub total_attempts: usize,
}

impl PipelineSummary {
    pub fn from_stages<'a>(stages: impl IntoIterator<Item = &'a StageResult>) -> Self {
        let mut summary = PipelineSummary::default();
        for stage in stages {
            let artifacts = &stage.final_artifacts;
            let entry = StageSummary {
                status: Some(stage.status),
                attempts: stage.attempts(),
                files: artifacts.generated_count(),
                placeholders: artifacts.len() - artifacts.generated_count(),
                bytes: artifacts.total_bytes(),
                lines: artifacts.total_lines(),
            };
            summary.total_files += entry.files;
            summary.total_bytes += entry.bytes;
            summary.total_lines += entry.lines;
            summary.total_attempts += entry.attempts;
            summary.stages.insert(stage.stage.clone(), entry);
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Final report of one pipeline run. Stage order matches execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub requirement: String,
    pub profile: ComplexityProfile,
    pub stages: IndexMap<String, StageResult>,
    pub overall_status: OverallStatus,
    pub summary: PipelineSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
}

impl PipelineResult {
    /// Assemble a result, deriving the overall status and summary from `stages`.
    pub fn assemble(
        requirement: impl Into<String>,
        profile: ComplexityProfile,
        stages: IndexMap<String, StageResult>,
        started_at: DateTime<Utc>,
        cancelled: bool,
    ) -> Self {
        let overall_status = OverallStatus::derive(stages.values());
        let summary = PipelineSummary::from_stages(stages.values());
        Self {
            run_id: Uuid::new_v4(),
            requirement: requirement.into(),
            profile,
            stages,
            overall_status,
            summary,
            started_at,
            finished_at: Utc::now(),
            cancelled,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.get(name)
    }

    /// Write the report as pretty JSON to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a report from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let result: Self = serde_json::from_str(&data)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Artifact, ArtifactSet, AttemptOutcome, ComplexityLevel, GenerationStrategy, InputVariant,
        StageAttempt,
    };

    fn profile() -> ComplexityProfile {
        ComplexityProfile {
            score: 22,
            level: ComplexityLevel::Simple,
            estimated_unit_count: 2,
            detected_entities: vec!["post".into(), "comment".into()],
            core_features: vec!["Full CRUD operations".into()],
            advanced_features: vec![],
            strategy: GenerationStrategy::SingleShot,
            word_count: 8,
            has_relationships: false,
            has_advanced_features: false,
            simplification_suggestions: vec![],
        }
    }

    fn succeeded(name: &str, mandatory: bool) -> StageResult {
        let mut artifacts = ArtifactSet::new();
        artifacts.insert(format!("{name}/a.txt"), Artifact::generated("one\ntwo\n"));
        artifacts.insert(format!("{name}/b.txt"), Artifact::Missing);
        StageResult {
            stage: name.into(),
            mandatory,
            status: StageStatus::Success,
            final_artifacts: artifacts.clone(),
            history: vec![StageAttempt {
                attempt_number: 1,
                input_variant: InputVariant::Original,
                input_text: "req".into(),
                outcome: AttemptOutcome::Success,
                error: None,
                error_kind: None,
                artifacts: Some(artifacts),
                file_log: vec![],
                duration_ms: 3,
            }],
            strategy_used: "single_shot".into(),
            last_error: None,
            skip_reason: None,
        }
    }

    fn failed(name: &str, mandatory: bool) -> StageResult {
        StageResult {
            stage: name.into(),
            mandatory,
            status: StageStatus::Failed,
            final_artifacts: ArtifactSet::new(),
            history: vec![],
            strategy_used: "single_shot".into(),
            last_error: Some("boom".into()),
            skip_reason: None,
        }
    }

    #[test]
    fn all_success_is_complete() {
        let stages = [succeeded("a", true), succeeded("b", false)];
        assert_eq!(OverallStatus::derive(&stages), OverallStatus::Complete);
    }

    #[test]
    fn optional_failure_degrades_to_partial() {
        let stages = [succeeded("a", true), failed("b", false)];
        assert_eq!(OverallStatus::derive(&stages), OverallStatus::Partial);
    }

    #[test]
    fn optional_skip_degrades_to_partial() {
        let stages = [
            succeeded("a", true),
            StageResult::skipped("b", false, "upstream failed"),
        ];
        assert_eq!(OverallStatus::derive(&stages), OverallStatus::Partial);
    }

    #[test]
    fn mandatory_failure_after_success_is_partial() {
        let stages = [succeeded("spec", true), failed("impl", true)];
        assert_eq!(OverallStatus::derive(&stages), OverallStatus::Partial);
    }

    #[test]
    fn nothing_succeeded_is_failed() {
        let stages = [
            failed("spec", true),
            StageResult::skipped("impl", true, "specification failed"),
        ];
        assert_eq!(OverallStatus::derive(&stages), OverallStatus::Failed);
        assert_eq!(OverallStatus::derive(std::iter::empty()), OverallStatus::Failed);
    }

    #[test]
    fn summary_counts_generated_content_only() {
        let stages = [succeeded("a", true), failed("b", false)];
        let summary = PipelineSummary::from_stages(&stages);
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.total_lines, 2);
        assert_eq!(summary.total_bytes, "one\ntwo\n".len());
        assert_eq!(summary.total_attempts, 1);
        assert_eq!(summary.stages["a"].placeholders, 1);
        assert_eq!(summary.stages["b"].status, Some(StageStatus::Failed));
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut stages = IndexMap::new();
        stages.insert("spec".to_string(), succeeded("spec", true));
        stages.insert("impl".to_string(), failed("impl", true));
        let result = PipelineResult::assemble("req", profile(), stages, Utc::now(), false);
        assert_eq!(result.overall_status, OverallStatus::Partial);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline_report.json");
        result.save(&path).unwrap();
        let loaded = PipelineResult::load(&path).unwrap();

        assert_eq!(loaded.run_id, result.run_id);
        assert_eq!(loaded.overall_status, OverallStatus::Partial);
        let names: Vec<&String> = loaded.stages.keys().collect();
        assert_eq!(names, vec!["spec", "impl"]);
        assert_eq!(loaded.profile, result.profile);
        assert_eq!(loaded.summary, result.summary);
    }

    #[test]
    fn load_nonexistent_file_is_io_error() {
        let err = PipelineResult::load(Path::new("/nonexistent/report.json")).unwrap_err();
        assert!(matches!(err, crate::HiveError::Io(_)));
    }
}
