//! Artifact generation for one stage.
//!
//! Single-shot mode makes one call and recovers a structured object from
//! the response. Chunked mode makes one call per expected file, concurrently
//! and bounded by a semaphore, and treats each response as literal file
//! content. Both return an [`ArtifactSet`] holding every expected key.

use std::sync::Arc;
use std::time::Duration;

use hive_llm::GenerativeService;
use hive_types::{
    truncate_chars, Artifact, ArtifactSet, FileOutcome, FileStatus, GenerationStrategy, HiveError,
    Result,
};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::prompts::{ContextItem, PromptBuilder};
use crate::recover::{strip_code_fence, Recoverer, RecoveryStrategy};
use crate::stage::{ExpectedFile, MissingKeyPolicy, StageSpec};

/// Output of one successful generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub artifacts: ArtifactSet,
    /// Per-key outcome, in expected-file order.
    pub log: Vec<FileOutcome>,
    pub mode: GenerationStrategy,
    /// Set for single-shot calls.
    pub recovery: Option<RecoveryStrategy>,
}

#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    pub max_concurrency: usize,
    pub call_timeout: Duration,
    /// Cap on per-file error text kept in placeholders.
    pub error_chars: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout: Duration::from_secs(120),
            error_chars: 200,
        }
    }
}

pub struct ArtifactGenerator {
    service: Arc<dyn GenerativeService>,
    recoverer: Recoverer,
    prompts: PromptBuilder,
    settings: GeneratorSettings,
}

impl ArtifactGenerator {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        recoverer: Recoverer,
        prompts: PromptBuilder,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            service,
            recoverer,
            prompts,
            settings,
        }
    }

    pub fn settings(&self) -> GeneratorSettings {
        self.settings
    }

    /// Generate every expected file of `stage`.
    ///
    /// Document stages are always single-shot regardless of `mode`.
    pub async fn generate(
        &self,
        stage: &StageSpec,
        requirement: &str,
        context: &[ContextItem],
        mode: GenerationStrategy,
    ) -> Result<Generated> {
        if stage.is_document() {
            return self.generate_document(stage, requirement, context).await;
        }
        match mode {
            GenerationStrategy::SingleShot => {
                self.generate_single_shot(stage, requirement, context).await
            }
            GenerationStrategy::Chunked => self.generate_chunked(stage, requirement, context).await,
        }
    }

    // -----------------------------------------------------------------------
    // Single-shot
    // -----------------------------------------------------------------------

    async fn call_structured(
        &self,
        stage: &StageSpec,
        requirement: &str,
        context: &[ContextItem],
    ) -> Result<(Map<String, Value>, RecoveryStrategy)> {
        let prompt = self.prompts.single_shot(stage, requirement, context);
        let raw = self
            .call(&stage.name, &prompt, stage.single_shot_max_tokens)
            .await?;
        let recovered = self.recoverer.recover(&raw)?;
        tracing::debug!(
            stage = %stage.name,
            strategy = %recovered.strategy,
            keys = recovered.value.len(),
            "recovered structured response"
        );
        Ok((recovered.value, recovered.strategy))
    }

    async fn generate_document(
        &self,
        stage: &StageSpec,
        requirement: &str,
        context: &[ContextItem],
    ) -> Result<Generated> {
        let Some(file) = stage.files.first() else {
            return Err(HiveError::Config(format!(
                "document stage '{}' declares no output file",
                stage.name
            )));
        };
        let (object, strategy) = self.call_structured(stage, requirement, context).await?;

        let missing: Vec<String> = stage
            .required_fields
            .iter()
            .filter(|f| object.get(f.as_str()).map_or(true, Value::is_null))
            .cloned()
            .collect();
        if !missing.is_empty() {
            match stage.missing_policy {
                MissingKeyPolicy::Fail => {
                    return Err(HiveError::IncompleteArtifactSet {
                        stage: stage.name.clone(),
                        missing,
                    })
                }
                MissingKeyPolicy::Placeholder | MissingKeyPolicy::RequireAny => {
                    tracing::warn!(
                        stage = %stage.name,
                        missing = ?missing,
                        "document lacks required fields"
                    );
                }
            }
        }

        let content = serde_json::to_string_pretty(&Value::Object(object))?;
        let artifact = Artifact::generated(content);
        let log = vec![FileOutcome::from_artifact(&file.key, &artifact)];
        let mut artifacts = ArtifactSet::new();
        artifacts.insert(file.key.clone(), artifact);

        Ok(Generated {
            artifacts,
            log,
            mode: GenerationStrategy::SingleShot,
            recovery: Some(strategy),
        })
    }

    async fn generate_single_shot(
        &self,
        stage: &StageSpec,
        requirement: &str,
        context: &[ContextItem],
    ) -> Result<Generated> {
        let (object, strategy) = self.call_structured(stage, requirement, context).await?;

        let mut artifacts = ArtifactSet::new();
        let mut log = Vec::with_capacity(stage.files.len());
        let mut missing = Vec::new();

        for file in &stage.files {
            let artifact = match lookup(&object, file).and_then(content_of) {
                Some(content) => Artifact::generated(content),
                None => {
                    missing.push(file.key.clone());
                    Artifact::Missing
                }
            };
            let mut outcome = FileOutcome::from_artifact(&file.key, &artifact);
            if outcome.status == FileStatus::Missing {
                outcome.detail = Some("not present in structured response".into());
            }
            log.push(outcome);
            artifacts.insert(file.key.clone(), artifact);
        }

        apply_missing_policy(stage, &artifacts, missing, || {
            "structured response contained none of the expected files".into()
        })?;

        Ok(Generated {
            artifacts,
            log,
            mode: GenerationStrategy::SingleShot,
            recovery: Some(strategy),
        })
    }

    // -----------------------------------------------------------------------
    // Chunked
    // -----------------------------------------------------------------------

    async fn generate_chunked(
        &self,
        stage: &StageSpec,
        requirement: &str,
        context: &[ContextItem],
    ) -> Result<Generated> {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, file) in stage.files.iter().enumerate() {
            let prompt = self.prompts.single_file(stage, file, requirement, context);
            let service = Arc::clone(&self.service);
            let permits = Arc::clone(&permits);
            let key = file.key.clone();
            let max_tokens = file.max_output_tokens;
            let timeout = self.settings.call_timeout;

            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        guarded_call(service.as_ref(), &key, &prompt, max_tokens, timeout).await
                    }
                    Err(_) => Err(HiveError::Other("concurrency limiter closed".into())),
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<String>>> = stage.files.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => {
                    if let Some(slot) = slots.get_mut(idx) {
                        *slot = Some(result);
                    }
                }
                Err(e) => tracing::error!(stage = %stage.name, error = %e, "file task aborted"),
            }
        }

        let mut artifacts = ArtifactSet::new();
        let mut log = Vec::with_capacity(stage.files.len());
        let mut missing = Vec::new();
        let mut first_error = None;

        for (file, slot) in stage.files.iter().zip(slots) {
            let artifact = match slot {
                Some(Ok(raw)) => {
                    let content = strip_code_fence(&raw);
                    if content.is_empty() {
                        Artifact::failed("empty response")
                    } else {
                        Artifact::generated(content)
                    }
                }
                Some(Err(e)) => {
                    Artifact::failed(truncate_chars(&e.to_string(), self.settings.error_chars))
                }
                None => Artifact::failed("generation task did not complete"),
            };
            if let Artifact::Failed { error } = &artifact {
                tracing::warn!(
                    stage = %stage.name,
                    file = %file.key,
                    error = %error,
                    "file generation failed"
                );
                first_error.get_or_insert_with(|| format!("{}: {error}", file.key));
                missing.push(file.key.clone());
            } else {
                tracing::debug!(
                    stage = %stage.name,
                    file = %file.key,
                    bytes = artifact.content().map_or(0, str::len),
                    "file generated"
                );
            }
            log.push(FileOutcome::from_artifact(&file.key, &artifact));
            artifacts.insert(file.key.clone(), artifact);
        }

        apply_missing_policy(stage, &artifacts, missing, || {
            first_error.unwrap_or_else(|| "no file was generated".into())
        })?;

        Ok(Generated {
            artifacts,
            log,
            mode: GenerationStrategy::Chunked,
            recovery: None,
        })
    }

    async fn call(&self, target: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        guarded_call(
            self.service.as_ref(),
            target,
            prompt,
            max_tokens,
            self.settings.call_timeout,
        )
        .await
    }
}

/// Decide whether an artifact set with absent keys is still a success.
///
/// `empty_reason` supplies the failure message when nothing was produced.
fn apply_missing_policy(
    stage: &StageSpec,
    artifacts: &ArtifactSet,
    missing: Vec<String>,
    empty_reason: impl FnOnce() -> String,
) -> Result<()> {
    if missing.is_empty() {
        return Ok(());
    }
    match stage.missing_policy {
        MissingKeyPolicy::Fail => Err(HiveError::IncompleteArtifactSet {
            stage: stage.name.clone(),
            missing,
        }),
        MissingKeyPolicy::RequireAny if !artifacts.has_content() => {
            Err(HiveError::GenerationCallFailed {
                target: stage.name.clone(),
                message: empty_reason(),
            })
        }
        MissingKeyPolicy::RequireAny | MissingKeyPolicy::Placeholder => {
            tracing::warn!(
                stage = %stage.name,
                missing = ?missing,
                generated = artifacts.generated_count(),
                "artifact set incomplete, filled with placeholders"
            );
            Ok(())
        }
    }
}

/// Service call with a hard timeout and an empty-response check.
async fn guarded_call(
    service: &dyn GenerativeService,
    target: &str,
    prompt: &str,
    max_tokens: u32,
    timeout: Duration,
) -> Result<String> {
    let text = tokio::time::timeout(timeout, service.complete(prompt, max_tokens, timeout))
        .await
        .map_err(|_| HiveError::RequestTimeout {
            provider: "generative-service".into(),
            timeout_ms: timeout.as_millis() as u64,
        })??;
    if text.trim().is_empty() {
        return Err(HiveError::GenerationCallFailed {
            target: target.to_string(),
            message: "empty response".into(),
        });
    }
    Ok(text)
}

/// Find a file's entry by exact key, then file name, then stem.
fn lookup<'a>(object: &'a Map<String, Value>, file: &ExpectedFile) -> Option<&'a Value> {
    object
        .get(&file.key)
        .or_else(|| object.get(file.file_name()))
        .or_else(|| object.get(file.stem()))
}

/// File content from a response value. Non-string values are rendered as
/// pretty JSON; null and blank strings count as absent.
fn content_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => serde_json::to_string_pretty(other).ok(),
    }
}
