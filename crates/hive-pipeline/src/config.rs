//! Pipeline configuration.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via [`PipelineConfig::apply_overrides`])
//! 2. TOML file passed with `--config`
//! 3. Compiled defaults

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use hive_llm::TransportConfig;
use hive_types::{GenerationStrategy, HiveError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::generator::GeneratorSettings;
use crate::recover::RecoveryConfig;
use crate::retry::{BackoffPolicy, LadderMode, RetryConfig};
use crate::stage::{ExpectedFile, MissingKeyPolicy, StageCatalog};
use crate::writer::safe_relative_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_attempts: usize,
    pub backoff_ms: u64,
    pub ladder: LadderMode,
    /// Stages expecting more units than this are generated chunked.
    pub chunk_threshold: usize,
    pub max_concurrency: usize,
    pub call_timeout_secs: u64,
    pub truncation_threshold: usize,
    pub snippet_chars: usize,
    pub error_chars: usize,
    pub context_chars: usize,
    /// Forces a generation mode for every non-document stage.
    pub strategy: Option<GenerationStrategy>,
    pub stages: IndexMap<String, StageOverride>,
    pub llm: LlmSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 2000,
            ladder: LadderMode::Auto,
            chunk_threshold: 4,
            max_concurrency: 4,
            call_timeout_secs: 120,
            truncation_threshold: 15_000,
            snippet_chars: 500,
            error_chars: 200,
            context_chars: 15_000,
            strategy: None,
            stages: IndexMap::new(),
            llm: LlmSettings::default(),
        }
    }
}

/// Per-stage overrides, keyed by stage name under `[stages.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOverride {
    pub missing_policy: Option<MissingKeyPolicy>,
    pub files: Option<Vec<ExpectedFile>>,
}

/// `[llm]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: Option<String>,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_idle_connections: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            model: None,
            api_key_env: "ANTHROPIC_API_KEY".into(),
            base_url: None,
            timeout_secs: transport.timeout.as_secs(),
            connect_timeout_secs: transport.connect_timeout.as_secs(),
            max_idle_connections: transport.max_idle_connections,
        }
    }
}

impl LlmSettings {
    pub fn transport_config(&self) -> TransportConfig {
        let mut transport = TransportConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_idle_connections: self.max_idle_connections,
            ..TransportConfig::default()
        };
        if let Some(url) = &self.base_url {
            transport = transport.with_base_url(url.clone());
        }
        transport
    }
}

/// Command-line overrides applied on top of file values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_attempts: Option<usize>,
    pub strategy: Option<GenerationStrategy>,
    pub max_concurrency: Option<usize>,
    pub model: Option<String>,
}

impl PipelineConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            HiveError::Config(msg) => HiveError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| HiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(n) = overrides.max_attempts {
            self.max_attempts = n;
        }
        if let Some(strategy) = overrides.strategy {
            self.strategy = Some(strategy);
        }
        if let Some(n) = overrides.max_concurrency {
            self.max_concurrency = n;
        }
        if let Some(model) = &overrides.model {
            self.llm.model = Some(model.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_attempts", self.max_attempts as u64),
            ("max_concurrency", self.max_concurrency as u64),
            ("call_timeout_secs", self.call_timeout_secs),
            ("context_chars", self.context_chars as u64),
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("llm.connect_timeout_secs", self.llm.connect_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(HiveError::Config(format!("{field} must be greater than 0")));
            }
        }
        let known = StageCatalog::default();
        for (name, stage) in &self.stages {
            let Some(spec) = known.get(name) else {
                return Err(HiveError::Config(format!("unknown stage '{name}'")));
            };
            if let Some(files) = &stage.files {
                if files.is_empty() {
                    return Err(HiveError::Config(format!(
                        "stages.{name}.files must not be empty"
                    )));
                }
                if spec.is_document() && files.len() != 1 {
                    return Err(HiveError::Config(format!(
                        "stages.{name}.files must name exactly one document"
                    )));
                }
                if let Some(file) = files.iter().find(|f| f.max_output_tokens == 0) {
                    return Err(HiveError::Config(format!(
                        "stages.{name}: file '{}' needs max_output_tokens > 0",
                        file.key
                    )));
                }
                let mut seen = HashSet::new();
                for file in files {
                    let path = safe_relative_path(&file.key).map_err(|_| {
                        HiveError::Config(format!(
                            "stages.{name}: file key '{}' is not a safe relative path",
                            file.key
                        ))
                    })?;
                    if !seen.insert(path) {
                        return Err(HiveError::Config(format!(
                            "stages.{name}: duplicate file key '{}'",
                            file.key
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Default catalog with per-stage overrides applied.
    pub fn catalog(&self) -> StageCatalog {
        let mut catalog = StageCatalog::default();
        for (name, over) in &self.stages {
            if let Some(stage) = catalog.get_mut(name) {
                if let Some(policy) = over.missing_policy {
                    stage.missing_policy = policy;
                }
                if let Some(files) = &over.files {
                    stage.files = files.clone();
                }
            }
        }
        catalog
    }

    pub fn retry_config(&self) -> RetryConfig {
        let backoff = if self.backoff_ms == 0 {
            BackoffPolicy::None
        } else {
            BackoffPolicy::Fixed(Duration::from_millis(self.backoff_ms))
        };
        RetryConfig {
            max_attempts: self.max_attempts,
            backoff,
            ladder: self.ladder,
            error_chars: self.error_chars,
        }
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            truncation_threshold: self.truncation_threshold,
            snippet_chars: self.snippet_chars,
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            max_concurrency: self.max_concurrency,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            error_chars: self.error_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{COMPANION, DEPLOYMENT, IMPLEMENTATION};

    #[test]
    fn empty_toml_gives_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.chunk_threshold, 4);
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn parses_full_file() {
        let text = r#"
max_attempts = 5
backoff_ms = 0
ladder = "full"
strategy = "chunked"
max_concurrency = 2

[stages.implementation]
missing_policy = "fail"

[stages.deployment]
files = [{ key = "deploy/Dockerfile", description = "image", max_output_tokens = 1500 }]

[llm]
model = "claude-sonnet-4-20250514"
base_url = "http://localhost:8080"
timeout_secs = 60
"#;
        let config = PipelineConfig::from_toml(text).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.ladder, LadderMode::Full);
        assert_eq!(config.strategy, Some(GenerationStrategy::Chunked));
        assert_eq!(config.retry_config().backoff, BackoffPolicy::None);

        let catalog = config.catalog();
        assert_eq!(
            catalog.get(IMPLEMENTATION).unwrap().missing_policy,
            MissingKeyPolicy::Fail
        );
        let deploy = catalog.get(DEPLOYMENT).unwrap();
        assert_eq!(deploy.files.len(), 1);
        assert_eq!(deploy.files[0].max_output_tokens, 1500);

        let transport = config.llm.transport_config();
        assert_eq!(transport.base_url, "http://localhost:8080");
        assert_eq!(transport.timeout, Duration::from_secs(60));
        assert_eq!(transport.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_values_are_rejected() {
        for text in ["max_attempts = 0", "max_concurrency = 0", "call_timeout_secs = 0"] {
            let err = PipelineConfig::from_toml(text).unwrap_err();
            assert!(matches!(err, HiveError::Config(_)), "{text}");
        }
        let err = PipelineConfig::from_toml("[llm]\ntimeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("llm.timeout_secs"));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = PipelineConfig::from_toml("[stages.marketing]\nmissing_policy = \"fail\"")
            .unwrap_err();
        assert!(err.to_string().contains("unknown stage 'marketing'"));
    }

    #[test]
    fn document_stage_needs_one_file() {
        let text = r#"
[stages.specification]
files = [
  { key = "a.json", description = "a", max_output_tokens = 10 },
  { key = "b.json", description = "b", max_output_tokens = 10 },
]
"#;
        assert!(PipelineConfig::from_toml(text).is_err());
    }

    #[test]
    fn file_overrides_need_unique_safe_keys() {
        let duplicate = r#"
[stages.deployment]
files = [
  { key = "deploy/Dockerfile", description = "a", max_output_tokens = 10 },
  { key = "deploy/Dockerfile", description = "b", max_output_tokens = 10 },
]
"#;
        let err = PipelineConfig::from_toml(duplicate).unwrap_err();
        assert!(err.to_string().contains("duplicate file key 'deploy/Dockerfile'"));

        let escaping = r#"
[stages.deployment]
files = [{ key = "../outside.sh", description = "a", max_output_tokens = 10 }]
"#;
        let err = PipelineConfig::from_toml(escaping).unwrap_err();
        assert!(matches!(
            err,
            HiveError::Config(ref msg) if msg.contains("not a safe relative path")
        ));
    }

    #[test]
    fn require_any_policy_parses() {
        let config =
            PipelineConfig::from_toml("[stages.companion]\nmissing_policy = \"require_any\"")
                .unwrap();
        assert_eq!(
            config.catalog().get(COMPANION).unwrap().missing_policy,
            MissingKeyPolicy::RequireAny
        );
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = PipelineConfig::from_toml("max_attempts = \"three\"").unwrap_err();
        assert!(matches!(err, HiveError::Config(_)));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut config =
            PipelineConfig::from_toml("max_attempts = 2\nmax_concurrency = 8").unwrap();
        config.apply_overrides(&ConfigOverrides {
            max_attempts: Some(4),
            strategy: Some(GenerationStrategy::SingleShot),
            max_concurrency: None,
            model: Some("custom-model".into()),
        });
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.strategy, Some(GenerationStrategy::SingleShot));
        assert_eq!(config.llm.model.as_deref(), Some("custom-model"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(&path, "chunk_threshold = 2\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.chunk_threshold, 2);
    }
}
