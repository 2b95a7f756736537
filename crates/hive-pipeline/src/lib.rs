//! Generation pipeline core.
//!
//! This crate turns a free-text requirement into staged artifact sets:
//! complexity classification, structured-output recovery, single-shot and
//! chunked generation, per-stage retries with input degradation, and the
//! orchestrator that sequences the stages and reports the run.

pub mod cancel;
pub mod complexity;
pub mod config;
pub mod events;
pub mod generator;
pub mod orchestrator;
pub mod prompts;
pub mod recover;
pub mod retry;
pub mod stage;
pub mod writer;

pub use cancel::CancellationToken;
pub use complexity::ComplexityClassifier;
pub use config::{ConfigOverrides, LlmSettings, PipelineConfig, StageOverride};
pub use events::{EventEmitter, PipelineEvent};
pub use generator::{ArtifactGenerator, Generated, GeneratorSettings};
pub use orchestrator::{PipelineOrchestrator, RunOptions};
pub use prompts::{ContextItem, PromptBuilder};
pub use recover::{recover, Recovered, Recoverer, RecoveryConfig, RecoveryStrategy};
pub use retry::{BackoffPolicy, LadderMode, RetryConfig, StageRetryEngine};
pub use stage::{ExpectedFile, MissingKeyPolicy, OutputShape, Prerequisite, StageCatalog, StageSpec};
pub use writer::{safe_relative_path, ArtifactWriter, WrittenFile};
