//! CLI binary for running the Hive generation pipeline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hive_llm::{
    AnthropicAdapter, GenerativeService, LlmClient, LoggingMiddleware, UsageTrackingMiddleware,
};
use hive_pipeline::{
    ArtifactWriter, CancellationToken, ComplexityClassifier, ConfigOverrides, EventEmitter,
    PipelineConfig, PipelineEvent, PipelineOrchestrator, Recoverer,
};
use hive_types::{GenerationStrategy, OverallStatus, PipelineResult};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hive", version, about = "Staged code generation from a free-text requirement")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the generated files
    Generate {
        /// Requirement text (or use --file)
        requirement: Option<String>,

        /// Read the requirement from a file
        #[arg(short, long, conflicts_with = "requirement")]
        file: Option<PathBuf>,

        /// Output directory for artifacts and reports
        #[arg(short, long, default_value = "generated")]
        out: PathBuf,

        /// Pipeline configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Attempts per stage
        #[arg(long)]
        max_attempts: Option<usize>,

        /// Force a generation mode: single-shot or chunked
        #[arg(long)]
        strategy: Option<GenerationStrategy>,

        /// Concurrent per-file calls in chunked mode
        #[arg(long)]
        concurrency: Option<usize>,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,

        /// Also write placeholder files for artifacts that were not produced
        #[arg(long)]
        include_placeholders: bool,
    },

    /// Print the complexity profile of a requirement as JSON
    Classify {
        /// Requirement text (or use --file)
        requirement: Option<String>,

        /// Read the requirement from a file
        #[arg(short, long, conflicts_with = "requirement")]
        file: Option<PathBuf>,
    },

    /// Recover a JSON object from a raw model response
    Recover {
        /// File holding the raw response text
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Generate {
            requirement,
            file,
            out,
            config,
            max_attempts,
            strategy,
            concurrency,
            model,
            include_placeholders,
        } => {
            let requirement = read_requirement(requirement, file.as_deref())?;
            let overrides = ConfigOverrides {
                max_attempts,
                strategy,
                max_concurrency: concurrency,
                model,
            };
            let status = cmd_generate(
                &requirement,
                &out,
                config.as_deref(),
                &overrides,
                include_placeholders,
            )
            .await?;
            if status == OverallStatus::Failed {
                std::process::exit(1);
            }
        }
        Commands::Classify { requirement, file } => {
            let requirement = read_requirement(requirement, file.as_deref())?;
            let profile = ComplexityClassifier::new().classify(&requirement);
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::Recover { input } => {
            cmd_recover(&input)?;
        }
    }

    Ok(())
}

fn read_requirement(inline: Option<String>, file: Option<&Path>) -> anyhow::Result<String> {
    let text = match (inline, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading requirement from {}", path.display()))?,
        (None, None) => anyhow::bail!("provide a requirement or --file"),
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        anyhow::bail!("requirement is empty");
    }
    Ok(text)
}

fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}

async fn cmd_generate(
    requirement: &str,
    out: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    include_placeholders: bool,
) -> anyhow::Result<OverallStatus> {
    let config = load_config(config_path, overrides)?;

    let transport = config.llm.transport_config();
    let adapter = AnthropicAdapter::from_env(&config.llm.api_key_env, &transport)?;
    let usage = UsageTrackingMiddleware::new();
    let mut client = LlmClient::new(adapter)
        .with_middleware(LoggingMiddleware)
        .with_middleware(usage.clone());
    if let Some(model) = &config.llm.model {
        client = client.with_model(model.clone());
    }
    let service: Arc<dyn GenerativeService> = Arc::new(client);

    let events = EventEmitter::default();
    let cancel = CancellationToken::new();
    let printer = tokio::spawn(print_progress(events.subscribe()));

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, interrupt).await {
            eprintln!("Aborted");
            std::process::exit(130);
        }
    });

    let orchestrator = PipelineOrchestrator::new(service, config)?
        .with_events(events)
        .with_cancellation(cancel);

    println!("Output: {}", out.display());
    let result = orchestrator.run(requirement).await;

    // Closing every sender ends the progress printer.
    drop(orchestrator);
    let _ = printer.await;

    write_outputs(&result, out, include_placeholders)?;
    print_summary(&result);
    println!(
        "Tokens: {} in / {} out across {} calls",
        usage.total_input_tokens(),
        usage.total_output_tokens(),
        usage.calls()
    );
    Ok(result.overall_status)
}

/// The first interrupt cancels the run once the in-flight stage finishes.
/// Returns `true` when a second interrupt arrives and the process should exit.
async fn watch_interrupts<S, Fut>(mut next_interrupt: S, cancel: CancellationToken) -> bool
where
    S: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    eprintln!("\nInterrupted; finishing the current stage (Ctrl-C again to abort)");
    cancel.cancel("interrupted by user");
    next_interrupt().await.is_ok()
}

fn write_outputs(
    result: &PipelineResult,
    out: &Path,
    include_placeholders: bool,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("creating output directory {}", out.display()))?;

    let writer = ArtifactWriter::new(out).include_placeholders(include_placeholders);
    for (name, stage) in &result.stages {
        let written = writer.write(&stage.final_artifacts)?;
        for file in &written {
            tracing::debug!(
                stage = %name,
                path = %file.path.display(),
                bytes = file.bytes,
                "written"
            );
        }
        if !written.is_empty() {
            println!("  {name}: {} files written", written.len());
        }
    }

    let analysis = out.join("complexity_analysis.json");
    std::fs::write(&analysis, serde_json::to_string_pretty(&result.profile)?)?;
    result.save(&out.join("pipeline_report.json"))?;
    Ok(())
}

async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<PipelineEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress output lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            PipelineEvent::PipelineStarted {
                run_id,
                strategy,
                stage_count,
            } => println!("Run {run_id}: {stage_count} stages, {strategy} strategy"),
            PipelineEvent::StageStarted { stage, strategy } => {
                println!("[{stage}] started ({strategy})")
            }
            PipelineEvent::AttemptFailed {
                stage,
                attempt,
                error,
            } => println!("[{stage}] attempt {attempt} failed: {error}"),
            PipelineEvent::StageRetrying {
                stage,
                attempt,
                input_variant,
            } => println!("[{stage}] retrying, attempt {attempt} with {input_variant} input"),
            PipelineEvent::StageCompleted {
                stage,
                status,
                attempts,
                duration_ms,
            } => println!("[{stage}] {status} after {attempts} attempt(s) in {duration_ms}ms"),
            PipelineEvent::StageSkipped { stage, reason } => {
                println!("[{stage}] skipped: {reason}")
            }
            PipelineEvent::PipelineCompleted {
                status,
                duration_ms,
                ..
            } => println!("Pipeline {status} in {duration_ms}ms"),
        }
    }
}

fn print_summary(result: &PipelineResult) {
    let summary = &result.summary;
    println!("\nStatus: {}", result.overall_status);
    println!(
        "Complexity: {} (score {})",
        result.profile.level, result.profile.score
    );
    for (name, stage) in &summary.stages {
        let status = stage
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "not run".into());
        println!(
            "  {name:<14} {status:<8} files={} placeholders={} lines={} attempts={}",
            stage.files, stage.placeholders, stage.lines, stage.attempts
        );
    }
    println!(
        "Total: {} files, {} lines, {} attempts",
        summary.total_files, summary.total_lines, summary.total_attempts
    );
    if result.cancelled {
        println!("Run was cancelled before every stage ran");
    }
}

fn cmd_recover(path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let recovered = Recoverer::default().recover(&raw)?;
    println!("Strategy: {}", recovered.strategy);
    println!("{}", serde_json::to_string_pretty(&recovered.value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use tokio::sync::Notify;

    type Interrupt = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

    /// Interrupt source fired by `notify_one`.
    fn interrupts(notify: &Arc<Notify>) -> impl FnMut() -> Interrupt + Send + 'static {
        let notify = Arc::clone(notify);
        move || {
            let notify = Arc::clone(&notify);
            Box::pin(async move {
                notify.notified().await;
                Ok(())
            })
        }
    }

    // 1. First interrupt cancels, second asks for exit
    #[tokio::test]
    async fn second_interrupt_requests_exit() {
        let notify = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_interrupts(interrupts(&notify), cancel.clone()));

        notify.notify_one();
        for _ in 0..100 {
            if cancel.is_cancelled() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(cancel.is_cancelled());
        assert_eq!(cancel.reason(), Some("interrupted by user"));
        assert!(!watcher.is_finished());

        notify.notify_one();
        assert!(watcher.await.unwrap());
    }

    // 2. No signal handler means no cancellation
    #[tokio::test]
    async fn failed_signal_registration_is_ignored() {
        let cancel = CancellationToken::new();
        let exit = watch_interrupts(
            || async { Err(std::io::Error::other("no signal support")) },
            cancel.clone(),
        )
        .await;
        assert!(!exit);
        assert!(!cancel.is_cancelled());
    }

    // 3. Requirement text is trimmed and must not be empty
    #[test]
    fn requirement_must_not_be_blank() {
        assert_eq!(read_requirement(Some("  a blog \n".into()), None).unwrap(), "a blog");
        assert!(read_requirement(Some("   ".into()), None).is_err());
        assert!(read_requirement(None, None).is_err());
    }
}
