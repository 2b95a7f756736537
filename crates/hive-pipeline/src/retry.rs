//! Stage retries with a fixed degradation ladder and backoff.
//!
//! [`StageRetryEngine::run_stage`] is the error boundary of the pipeline: every
//! failure of the wrapped call is recorded as a [`StageAttempt`] and the
//! caller always gets a [`StageResult`] back.

use std::future::Future;
use std::time::{Duration, Instant};

use hive_types::{
    truncate_chars, ArtifactSet, AttemptOutcome, DegradationLevel, GenerationStrategy, HiveError,
    InputVariant, Result, StageAttempt, StageResult, StageStatus,
};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::complexity::ComplexityClassifier;
use crate::events::{EventEmitter, PipelineEvent};
use crate::generator::Generated;

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Backoff policy controlling the delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Fixed delay between attempts.
    Fixed(Duration),
    /// No delay between attempts.
    None,
}

impl BackoffPolicy {
    /// Compute the delay before the attempt following `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, _attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed(Duration::from_secs(2))
    }
}

// ---------------------------------------------------------------------------
// Degradation ladder
// ---------------------------------------------------------------------------

/// Which input variant each attempt index uses.
///
/// The mapping depends only on the attempt number and the attempt budget,
/// never on earlier errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderMode {
    /// `SkipModerate` for budgets under four attempts, `Full` otherwise.
    #[default]
    Auto,
    /// original, light, minimal, minimal, ...
    SkipModerate,
    /// original, light, moderate, minimal, minimal, ...
    Full,
}

impl LadderMode {
    pub fn variant_for_attempt(self, attempt: usize, max_attempts: usize) -> InputVariant {
        let mode = match self {
            LadderMode::Auto if max_attempts >= 4 => LadderMode::Full,
            LadderMode::Auto => LadderMode::SkipModerate,
            other => other,
        };
        match (mode, attempt) {
            (_, 0 | 1) => InputVariant::Original,
            (_, 2) => InputVariant::Degraded(DegradationLevel::Light),
            (LadderMode::Full, 3) => InputVariant::Degraded(DegradationLevel::Moderate),
            _ => InputVariant::Degraded(DegradationLevel::Minimal),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub backoff: BackoffPolicy,
    pub ladder: LadderMode,
    /// Cap on error text stored per attempt.
    pub error_chars: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            ladder: LadderMode::Auto,
            error_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StageRetryEngine {
    config: RetryConfig,
    classifier: ComplexityClassifier,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl StageRetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Requirement text for an attempt's input variant.
    pub fn input_for(&self, requirement: &str, variant: InputVariant) -> String {
        match variant {
            InputVariant::Original => requirement.to_string(),
            InputVariant::Degraded(level) => self.classifier.degrade(requirement, level),
        }
    }

    /// Run `attempt_fn` until it succeeds or the attempt budget is spent.
    ///
    /// `attempt_fn` receives the input variant and the requirement text for
    /// that variant. Cancellation is honoured between attempts only.
    pub async fn run_stage<F, Fut>(
        &self,
        stage: &str,
        mandatory: bool,
        requirement: &str,
        strategy: GenerationStrategy,
        mut attempt_fn: F,
    ) -> StageResult
    where
        F: FnMut(InputVariant, String) -> Fut,
        Fut: Future<Output = Result<Generated>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut history: Vec<StageAttempt> = Vec::with_capacity(max_attempts);
        let mut strategy_used = strategy.to_string();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                if self.cancel.is_cancelled() {
                    tracing::info!(stage = %stage, attempt, "cancelled before next attempt");
                    break;
                }
                let delay = self.config.backoff.delay_for_attempt(attempt - 1);
                if !delay.is_zero() {
                    tracing::info!(
                        stage = %stage,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        "backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            let variant = self.config.ladder.variant_for_attempt(attempt, max_attempts);
            let input_text = self.input_for(requirement, variant);
            if attempt > 1 {
                self.events.emit(PipelineEvent::StageRetrying {
                    stage: stage.to_string(),
                    attempt,
                    input_variant: variant.to_string(),
                });
            }

            let started = Instant::now();
            let outcome = attempt_fn(variant, input_text.clone()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(generated) => {
                    strategy_used = generated.mode.to_string();
                    tracing::info!(
                        stage = %stage,
                        attempt,
                        input = %variant,
                        strategy = %strategy_used,
                        files = generated.artifacts.generated_count(),
                        bytes = generated.artifacts.total_bytes(),
                        "stage attempt succeeded"
                    );
                    history.push(StageAttempt {
                        attempt_number: attempt,
                        input_variant: variant,
                        input_text,
                        outcome: AttemptOutcome::Success,
                        error: None,
                        error_kind: None,
                        artifacts: Some(generated.artifacts.clone()),
                        file_log: generated.log,
                        duration_ms,
                    });
                    return StageResult {
                        stage: stage.to_string(),
                        mandatory,
                        status: StageStatus::Success,
                        final_artifacts: generated.artifacts,
                        history,
                        strategy_used,
                        last_error: None,
                        skip_reason: None,
                    };
                }
                Err(err) => {
                    let message = truncate_chars(&err.to_string(), self.config.error_chars);
                    tracing::warn!(
                        stage = %stage,
                        attempt,
                        input = %variant,
                        kind = ?err.kind(),
                        error = %message,
                        "stage attempt failed"
                    );
                    self.events.emit(PipelineEvent::AttemptFailed {
                        stage: stage.to_string(),
                        attempt,
                        error: message.clone(),
                    });
                    history.push(StageAttempt {
                        attempt_number: attempt,
                        input_variant: variant,
                        input_text,
                        outcome: AttemptOutcome::Failure,
                        error: Some(message),
                        error_kind: Some(err.kind()),
                        artifacts: None,
                        file_log: Vec::new(),
                        duration_ms,
                    });
                }
            }
        }

        let last = history
            .last()
            .and_then(|a| a.error.clone())
            .unwrap_or_default();
        let exhausted = HiveError::StageExhausted {
            stage: stage.to_string(),
            attempts: history.len(),
            last_error: last,
        };
        tracing::error!(stage = %stage, attempts = history.len(), mandatory, "stage exhausted");

        StageResult {
            stage: stage.to_string(),
            mandatory,
            status: StageStatus::Failed,
            final_artifacts: ArtifactSet::new(),
            history,
            strategy_used,
            last_error: Some(exhausted.to_string()),
            skip_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::{Artifact, ErrorKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const REQUIREMENT: &str =
        "Create a blog with users, posts and comments with search and pagination";

    fn ok_generated() -> Generated {
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("a.txt", Artifact::generated("hello"));
        Generated {
            log: vec![],
            artifacts,
            mode: GenerationStrategy::SingleShot,
            recovery: None,
        }
    }

    fn malformed() -> HiveError {
        HiveError::UnrecoverableOutput {
            parse_error: "expected value".into(),
            candidate_len: 10,
            snippet: "{oops".into(),
        }
    }

    fn engine(max_attempts: usize) -> StageRetryEngine {
        StageRetryEngine::new(RetryConfig {
            max_attempts,
            backoff: BackoffPolicy::None,
            ..RetryConfig::default()
        })
    }

    // 1. Success on first attempt
    #[tokio::test]
    async fn success_on_first_attempt() {
        let result = engine(3)
            .run_stage(
                "spec",
                true,
                REQUIREMENT,
                GenerationStrategy::SingleShot,
                |_, _| async { Ok(ok_generated()) },
            )
            .await;

        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history[0].input_variant, InputVariant::Original);
        assert_eq!(result.history[0].input_text, REQUIREMENT);
        assert_eq!(result.final_artifacts.len(), 1);
        assert_eq!(result.strategy_used, "single_shot");
    }

    // 2. Fails once then succeeds
    #[tokio::test]
    async fn fails_once_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cc = calls.clone();
        let result = engine(3)
            .run_stage(
                "impl",
                true,
                REQUIREMENT,
                GenerationStrategy::Chunked,
                move |_, _| {
                    let cc = cc.clone();
                    async move {
                        if cc.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(malformed())
                        } else {
                            Ok(ok_generated())
                        }
                    }
                },
            )
            .await;

        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(result.history.len(), 2);
        assert_eq!(result.history[0].outcome, AttemptOutcome::Failure);
        assert_eq!(result.history[0].error_kind, Some(ErrorKind::MalformedOutput));
        assert!(result.history[1].is_success());
        assert_eq!(
            result.history[1].input_variant,
            InputVariant::Degraded(DegradationLevel::Light)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    // 3. Always failing with the default budget walks original, light, minimal
    #[tokio::test]
    async fn always_failing_exhausts_default_ladder() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let result = engine(3)
            .run_stage(
                "impl",
                true,
                REQUIREMENT,
                GenerationStrategy::SingleShot,
                move |variant, text| {
                    log.lock().unwrap().push((variant, text));
                    async { Err(malformed()) }
                },
            )
            .await;

        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.final_artifacts.is_empty());
        let variants: Vec<InputVariant> = result.history.iter().map(|a| a.input_variant).collect();
        assert_eq!(
            variants,
            vec![
                InputVariant::Original,
                InputVariant::Degraded(DegradationLevel::Light),
                InputVariant::Degraded(DegradationLevel::Minimal),
            ]
        );
        let classifier = ComplexityClassifier::new();
        let texts: Vec<String> = seen.lock().unwrap().iter().map(|(_, t)| t.clone()).collect();
        assert_eq!(texts[0], REQUIREMENT);
        assert_eq!(texts[1], classifier.degrade(REQUIREMENT, DegradationLevel::Light));
        assert_eq!(texts[2], classifier.degrade(REQUIREMENT, DegradationLevel::Minimal));
        let last = result.last_error.unwrap();
        assert!(last.contains("exhausted 3 attempts"), "{last}");
    }

    // 4. Larger budgets reach the moderate rung
    #[test]
    fn ladder_modes() {
        use DegradationLevel::*;
        let auto4: Vec<InputVariant> = (1..=5)
            .map(|a| LadderMode::Auto.variant_for_attempt(a, 5))
            .collect();
        assert_eq!(
            auto4,
            vec![
                InputVariant::Original,
                InputVariant::Degraded(Light),
                InputVariant::Degraded(Moderate),
                InputVariant::Degraded(Minimal),
                InputVariant::Degraded(Minimal),
            ]
        );
        assert_eq!(
            LadderMode::Full.variant_for_attempt(3, 3),
            InputVariant::Degraded(Moderate)
        );
        assert_eq!(
            LadderMode::SkipModerate.variant_for_attempt(3, 6),
            InputVariant::Degraded(Minimal)
        );
    }

    // 5. Error text is truncated
    #[tokio::test]
    async fn error_messages_are_truncated() {
        let result = engine(1)
            .run_stage(
                "spec",
                true,
                REQUIREMENT,
                GenerationStrategy::SingleShot,
                |_, _| async { Err(HiveError::Other("x".repeat(1_000))) },
            )
            .await;
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history[0].error.as_ref().unwrap().chars().count(), 200);
    }

    // 6. Cancellation stops further attempts but keeps the first
    #[tokio::test]
    async fn cancellation_stops_between_attempts() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let result = engine(3)
            .with_cancellation(cancel)
            .run_stage(
                "impl",
                true,
                REQUIREMENT,
                GenerationStrategy::SingleShot,
                move |_, _| {
                    trigger.cancel("test");
                    async { Err(malformed()) }
                },
            )
            .await;
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.history.len(), 1);
    }

    // 7. Fixed backoff sleeps between attempts only
    #[tokio::test(start_paused = true)]
    async fn fixed_backoff_between_attempts() {
        let engine = StageRetryEngine::new(RetryConfig {
            max_attempts: 3,
            backoff: BackoffPolicy::Fixed(Duration::from_secs(2)),
            ..RetryConfig::default()
        });
        let start = tokio::time::Instant::now();
        engine
            .run_stage("s", false, "x", GenerationStrategy::SingleShot, |_, _| async {
                Err(malformed())
            })
            .await;
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    // 8. Retry events are emitted
    #[tokio::test]
    async fn emits_attempt_and_retry_events() {
        let events = EventEmitter::new(32);
        let mut rx = events.subscribe();
        engine(2)
            .with_events(events)
            .run_stage("deploy", false, "x", GenerationStrategy::SingleShot, |_, _| async {
                Err(malformed())
            })
            .await;

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(match event {
                PipelineEvent::AttemptFailed { attempt, .. } => format!("failed:{attempt}"),
                PipelineEvent::StageRetrying { attempt, .. } => format!("retry:{attempt}"),
                other => format!("{other:?}"),
            });
        }
        assert_eq!(names, vec!["failed:1", "retry:2", "failed:2"]);
    }

    #[test]
    fn fixed_backoff_constant_delay() {
        let policy = BackoffPolicy::Fixed(Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(200));
        assert_eq!(BackoffPolicy::None.delay_for_attempt(3), Duration::ZERO);
        assert_eq!(BackoffPolicy::default().delay_for_attempt(1), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn zero_budget_still_runs_once() {
        let result = engine(0)
            .run_stage("s", true, "x", GenerationStrategy::SingleShot, |_, _| async {
                Err(malformed())
            })
            .await;
        assert_eq!(result.history.len(), 1);
    }
}
