use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Artifact — one generated file or document
// ---------------------------------------------------------------------------

/// Content for a single expected key of a stage.
///
/// Every expected key ends up with an entry; keys the generator could not
/// produce carry an explicit placeholder variant rather than being absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Content returned by the generative service.
    Generated { content: String },
    /// The key was absent from a single-shot response.
    Missing,
    /// The per-key generation call failed in chunked mode.
    Failed { error: String },
}

impl Artifact {
    pub fn generated(content: impl Into<String>) -> Self {
        Artifact::Generated {
            content: content.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Artifact::Failed {
            error: error.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, Artifact::Generated { .. })
    }

    /// Generated content, or `None` for placeholders.
    pub fn content(&self) -> Option<&str> {
        match self {
            Artifact::Generated { content } => Some(content),
            _ => None,
        }
    }

    /// Text to write for this artifact. Placeholders render as a marker line
    /// that cannot be mistaken for generated code.
    pub fn render(&self, key: &str) -> String {
        match self {
            Artifact::Generated { content } => content.clone(),
            Artifact::Missing => format!("# [hive placeholder] {key} was not produced\n"),
            Artifact::Failed { error } => {
                format!("# [hive placeholder] error generating {key}: {error}\n")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactSet — ordered mapping from artifact key to content
// ---------------------------------------------------------------------------

/// Ordered map from artifact key (relative file path or document name) to content.
///
/// Iteration follows insertion order, which generators keep equal to the
/// stage's expected-key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet {
    entries: IndexMap<String, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, artifact: Artifact) -> Option<Artifact> {
        self.entries.insert(key.into(), artifact)
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Artifact)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries holding generated content.
    pub fn generated_count(&self) -> usize {
        self.entries.values().filter(|a| !a.is_placeholder()).count()
    }

    /// Keys whose entry is a placeholder, in order.
    pub fn placeholder_keys(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, a)| a.is_placeholder())
            .map(|(k, _)| k)
            .collect()
    }

    /// `true` when at least one entry carries generated content.
    pub fn has_content(&self) -> bool {
        self.generated_count() > 0
    }

    /// Total bytes of generated content.
    pub fn total_bytes(&self) -> usize {
        self.entries
            .values()
            .filter_map(Artifact::content)
            .map(str::len)
            .sum()
    }

    /// Total lines of generated content.
    pub fn total_lines(&self) -> usize {
        self.entries
            .values()
            .filter_map(Artifact::content)
            .map(|c| c.lines().count())
            .sum()
    }
}

impl FromIterator<(String, Artifact)> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = (String, Artifact)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ArtifactSet {
    type Item = (String, Artifact);
    type IntoIter = indexmap::map::IntoIter<String, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ---------------------------------------------------------------------------
// FileOutcome — per-key generation log entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Generated,
    Missing,
    Failed,
}

/// What happened to one expected key during a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub key: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default)]
    pub bytes: usize,
}

impl FileOutcome {
    pub fn from_artifact(key: &str, artifact: &Artifact) -> Self {
        match artifact {
            Artifact::Generated { content } => Self {
                key: key.to_string(),
                status: FileStatus::Generated,
                detail: None,
                bytes: content.len(),
            },
            Artifact::Missing => Self {
                key: key.to_string(),
                status: FileStatus::Missing,
                detail: None,
                bytes: 0,
            },
            Artifact::Failed { error } => Self {
                key: key.to_string(),
                status: FileStatus::Failed,
                detail: Some(error.clone()),
                bytes: 0,
            },
        }
    }
}
