//! Runs the stage catalog in order and assembles a [`PipelineResult`].
//!
//! Each stage goes through the [`StageRetryEngine`]; the orchestrator only
//! decides whether a stage runs at all, which upstream artifacts it sees, and
//! which generation mode it uses.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hive_llm::GenerativeService;
use hive_types::{
    ComplexityProfile, GenerationStrategy, PipelineResult, Result, StageResult, StageStatus,
};
use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::complexity::ComplexityClassifier;
use crate::config::PipelineConfig;
use crate::events::{EventEmitter, PipelineEvent};
use crate::generator::ArtifactGenerator;
use crate::prompts::{ContextItem, PromptBuilder};
use crate::recover::Recoverer;
use crate::retry::StageRetryEngine;
use crate::stage::{StageCatalog, StageSpec, SPECIFICATION};

/// Per-run overrides supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub max_attempts: Option<usize>,
    pub strategy: Option<GenerationStrategy>,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    catalog: StageCatalog,
    classifier: ComplexityClassifier,
    generator: ArtifactGenerator,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(service: Arc<dyn GenerativeService>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let generator = ArtifactGenerator::new(
            service,
            Recoverer::new(config.recovery_config()),
            PromptBuilder::new(config.context_chars),
            config.generator_settings(),
        );
        Ok(Self {
            catalog: config.catalog(),
            config,
            classifier: ComplexityClassifier::new(),
            generator,
            events: EventEmitter::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    pub fn classify(&self, requirement: &str) -> ComplexityProfile {
        self.classifier.classify(requirement)
    }

    pub async fn run(&self, requirement: &str) -> PipelineResult {
        self.run_with(requirement, &RunOptions::default()).await
    }

    pub async fn run_with(&self, requirement: &str, options: &RunOptions) -> PipelineResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = Uuid::new_v4();
        let profile = self.classifier.classify(requirement);
        let run_strategy = options.strategy.or(self.config.strategy);

        let mut retry_config = self.config.retry_config();
        if let Some(n) = options.max_attempts {
            retry_config.max_attempts = n;
        }
        let engine = StageRetryEngine::new(retry_config)
            .with_events(self.events.clone())
            .with_cancellation(self.cancel.clone());

        tracing::info!(
            run_id = %run_id,
            score = profile.score,
            level = ?profile.level,
            strategy = %profile.strategy,
            units = profile.estimated_unit_count,
            "pipeline started"
        );
        self.events.emit(PipelineEvent::PipelineStarted {
            run_id: run_id.to_string(),
            strategy: profile.strategy.to_string(),
            stage_count: self.catalog.len(),
        });

        let mut stages: IndexMap<String, StageResult> = IndexMap::new();
        for spec in self.catalog.iter() {
            if let Some(reason) = self.skip_reason(spec, &stages) {
                tracing::info!(stage = %spec.name, reason = %reason, "stage skipped");
                self.events.emit(PipelineEvent::StageSkipped {
                    stage: spec.name.clone(),
                    reason: reason.clone(),
                });
                stages.insert(
                    spec.name.clone(),
                    StageResult::skipped(&spec.name, spec.mandatory, reason),
                );
                continue;
            }

            let units = unit_count(&stages, &profile);
            let mode = select_mode(
                spec,
                run_strategy,
                &profile,
                units,
                self.config.chunk_threshold,
            );
            let context = gather_context(spec, &stages);

            tracing::info!(stage = %spec.name, strategy = %mode, units, "stage started");
            self.events.emit(PipelineEvent::StageStarted {
                stage: spec.name.clone(),
                strategy: mode.to_string(),
            });
            let stage_clock = Instant::now();

            let generator = &self.generator;
            let context = &context;
            let result = engine
                .run_stage(
                    &spec.name,
                    spec.mandatory,
                    requirement,
                    mode,
                    move |_, text| async move {
                        generator.generate(spec, &text, context, mode).await
                    },
                )
                .await;

            self.events.emit(PipelineEvent::StageCompleted {
                stage: spec.name.clone(),
                status: result.status.to_string(),
                attempts: result.attempts(),
                duration_ms: stage_clock.elapsed().as_millis() as u64,
            });
            stages.insert(spec.name.clone(), result);
        }

        let cancelled = self.cancel.is_cancelled();
        let mut result =
            PipelineResult::assemble(requirement, profile, stages, started_at, cancelled);
        result.run_id = run_id;

        tracing::info!(
            status = %result.overall_status,
            files = result.summary.total_files,
            bytes = result.summary.total_bytes,
            attempts = result.summary.total_attempts,
            "pipeline finished"
        );
        self.events.emit(PipelineEvent::PipelineCompleted {
            run_id: run_id.to_string(),
            status: result.overall_status.to_string(),
            duration_ms: clock.elapsed().as_millis() as u64,
        });
        result
    }

    fn skip_reason(
        &self,
        spec: &StageSpec,
        done: &IndexMap<String, StageResult>,
    ) -> Option<String> {
        if self.cancel.is_cancelled() {
            let why = self.cancel.reason().unwrap_or("no reason given");
            return Some(format!("cancelled: {why}"));
        }
        for prereq in &spec.prerequisites {
            match done.get(&prereq.stage) {
                Some(r) if r.status == StageStatus::Success => {
                    if prereq.needs_content && !r.final_artifacts.has_content() {
                        return Some(format!("{} stage produced no content", prereq.stage));
                    }
                }
                Some(r) => return Some(format!("{} stage {}", prereq.stage, r.status)),
                None => return Some(format!("{} stage did not run", prereq.stage)),
            }
        }
        None
    }
}

/// Expected unit count for stages after the specification: the number of
/// entities it declares, or the classifier's estimate when it declares none.
fn unit_count(done: &IndexMap<String, StageResult>, profile: &ComplexityProfile) -> usize {
    let declared = done
        .get(SPECIFICATION)
        .filter(|r| r.is_success())
        .and_then(|r| r.final_artifacts.iter().find_map(|(_, a)| a.content()))
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .and_then(|doc| doc.get("entities").and_then(Value::as_array).map(Vec::len))
        .unwrap_or(0);
    if declared > 0 {
        declared
    } else {
        profile.estimated_unit_count
    }
}

/// Chunked when the run forces it, or (with no override) when the profile
/// asks for it or the unit count exceeds the threshold.
fn select_mode(
    spec: &StageSpec,
    forced: Option<GenerationStrategy>,
    profile: &ComplexityProfile,
    units: usize,
    chunk_threshold: usize,
) -> GenerationStrategy {
    if spec.is_document() {
        return GenerationStrategy::SingleShot;
    }
    if let Some(strategy) = forced {
        return strategy;
    }
    if profile.strategy == GenerationStrategy::Chunked || units > chunk_threshold {
        GenerationStrategy::Chunked
    } else {
        GenerationStrategy::SingleShot
    }
}

/// Generated artifacts of the stages `spec` reads from, in catalog order.
fn gather_context(spec: &StageSpec, done: &IndexMap<String, StageResult>) -> Vec<ContextItem> {
    spec.context_from
        .iter()
        .filter_map(|name| done.get(name))
        .filter(|r| r.is_success())
        .flat_map(|r| r.final_artifacts.iter())
        .filter_map(|(key, artifact)| artifact.content().map(|c| ContextItem::new(key, c)))
        .collect()
}
