use serde::{Deserialize, Serialize};

/// Coarse complexity bucket derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityLevel {
    /// Bucket a 0-100 score: below 30 is simple, below 60 moderate.
    pub fn from_score(score: u32) -> Self {
        if score < 30 {
            ComplexityLevel::Simple
        } else if score < 60 {
            ComplexityLevel::Moderate
        } else {
            ComplexityLevel::Complex
        }
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplexityLevel::Simple => write!(f, "simple"),
            ComplexityLevel::Moderate => write!(f, "moderate"),
            ComplexityLevel::Complex => write!(f, "complex"),
        }
    }
}

/// How a stage's artifacts are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStrategy {
    /// One call returns every artifact as a single JSON object.
    SingleShot,
    /// One call per expected artifact key.
    Chunked,
}

impl std::fmt::Display for GenerationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationStrategy::SingleShot => write!(f, "single_shot"),
            GenerationStrategy::Chunked => write!(f, "chunked"),
        }
    }
}

impl std::str::FromStr for GenerationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_shot" | "single-shot" | "single" => Ok(GenerationStrategy::SingleShot),
            "chunked" => Ok(GenerationStrategy::Chunked),
            other => Err(format!("unknown generation strategy: {other}")),
        }
    }
}

/// Classifier output for one requirement text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityProfile {
    /// 0-100 inclusive.
    pub score: u32,
    pub level: ComplexityLevel,
    /// Estimated number of domain entities, at least 1.
    pub estimated_unit_count: usize,
    /// Entity nouns recognized in the text, in vocabulary order.
    #[serde(default)]
    pub detected_entities: Vec<String>,
    pub core_features: Vec<String>,
    pub advanced_features: Vec<String>,
    pub strategy: GenerationStrategy,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub has_relationships: bool,
    #[serde(default)]
    pub has_advanced_features: bool,
    #[serde(default)]
    pub simplification_suggestions: Vec<String>,
}
