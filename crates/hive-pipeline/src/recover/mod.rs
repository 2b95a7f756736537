//! Structured-output recovery.
//!
//! Turns free-form generative-service text into one JSON object through an
//! ordered strategy chain; the first strategy that yields an object wins:
//!
//! 1. [`RecoveryStrategy::FencedBlock`]: parse each fenced block in order
//! 2. [`RecoveryStrategy::Direct`]: parse the candidate (first `{` to last `}`)
//! 3. [`RecoveryStrategy::SyntaxRepair`]: fix commas, then parse
//! 4. [`RecoveryStrategy::TruncationRepair`]: only for large candidates, close
//!    unbalanced containers, then parse
//!
//! When every strategy fails the caller gets [`HiveError::UnrecoverableOutput`]
//! with the direct-parse error, the candidate length, and a leading snippet.

mod fence;
mod repair;
mod truncation;

pub use fence::{extract_fenced_blocks, strip_code_fence};
pub use repair::repair_syntax;
pub use truncation::{close_truncated, repair_truncated};

use hive_types::{truncate_chars, HiveError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which strategy produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    FencedBlock,
    Direct,
    SyntaxRepair,
    TruncationRepair,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryStrategy::FencedBlock => "fenced_block",
            RecoveryStrategy::Direct => "direct",
            RecoveryStrategy::SyntaxRepair => "syntax_repair",
            RecoveryStrategy::TruncationRepair => "truncation_repair",
        };
        f.write_str(s)
    }
}

/// A recovered object tagged with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Map<String, Value>,
    pub strategy: RecoveryStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Candidates longer than this many characters are assumed truncated
    /// when the earlier strategies fail.
    pub truncation_threshold: usize,
    /// Characters of the candidate quoted in an `UnrecoverableOutput` error.
    pub snippet_chars: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            truncation_threshold: 15_000,
            snippet_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Recoverer {
    config: RecoveryConfig,
}

impl Recoverer {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> RecoveryConfig {
        self.config
    }

    pub fn recover(&self, raw: &str) -> Result<Recovered> {
        for block in extract_fenced_blocks(raw) {
            if let Some(value) = parse_object(block) {
                return Ok(tagged(value, RecoveryStrategy::FencedBlock));
            }
        }

        let Some(candidate) = locate_candidate(raw) else {
            return Err(HiveError::UnrecoverableOutput {
                parse_error: "no JSON object found in response".into(),
                candidate_len: 0,
                snippet: truncate_chars(raw, self.config.snippet_chars),
            });
        };

        let parse_error = match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Ok(tagged(map, RecoveryStrategy::Direct)),
            Ok(other) => format!("expected a JSON object, found {}", kind_of(&other)),
            Err(e) => e.to_string(),
        };

        let repaired = repair_syntax(candidate);
        if let Some(value) = parse_object(&repaired) {
            tracing::debug!(len = candidate.len(), "recovered output via syntax repair");
            return Ok(tagged(value, RecoveryStrategy::SyntaxRepair));
        }

        let candidate_len = candidate.chars().count();
        if candidate_len > self.config.truncation_threshold {
            if let Some((_, Value::Object(map))) = repair_truncated(&repaired) {
                tracing::warn!(
                    len = candidate_len,
                    "recovered truncated output; content past the cut is lost"
                );
                return Ok(tagged(map, RecoveryStrategy::TruncationRepair));
            }
        }

        Err(HiveError::UnrecoverableOutput {
            parse_error,
            candidate_len,
            snippet: truncate_chars(candidate, self.config.snippet_chars),
        })
    }
}

/// Recover with the default configuration.
pub fn recover(raw: &str) -> Result<Recovered> {
    Recoverer::default().recover(raw)
}

/// Substring from the first `{` to the last `}` inclusive. When no `}`
/// follows the first `{`, runs to the end of the text.
fn locate_candidate(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    match raw.rfind('}') {
        Some(end) if end > start => Some(&raw[start..=end]),
        _ => Some(raw[start..].trim_end()),
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn tagged(value: Map<String, Value>, strategy: RecoveryStrategy) -> Recovered {
    Recovered { value, strategy }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
