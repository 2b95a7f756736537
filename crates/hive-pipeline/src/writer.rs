//! Writes artifact sets to disk under a destination root.

use std::path::{Component, Path, PathBuf};

use hive_types::{Artifact, ArtifactSet, HiveError, Result};
use serde::Serialize;

/// One file written by [`ArtifactWriter::write`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenFile {
    pub key: String,
    pub path: PathBuf,
    pub bytes: usize,
    pub lines: usize,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    include_placeholders: bool,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_placeholders: false,
        }
    }

    /// Also write placeholder files for keys that were not produced.
    pub fn include_placeholders(mut self, include: bool) -> Self {
        self.include_placeholders = include;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write every artifact of `set`. Keys are validated before anything is
    /// written, so an unsafe key leaves the destination untouched.
    pub fn write(&self, set: &ArtifactSet) -> Result<Vec<WrittenFile>> {
        let mut planned = Vec::with_capacity(set.len());
        for (key, artifact) in set.iter() {
            let relative = safe_relative_path(key)?;
            let content = match artifact {
                Artifact::Generated { content } => content.clone(),
                _ if self.include_placeholders => artifact.render(key),
                _ => {
                    tracing::debug!(key, "skipping placeholder artifact");
                    continue;
                }
            };
            planned.push((key, self.root.join(relative), content));
        }

        let mut written = Vec::with_capacity(planned.len());
        for (key, path, content) in planned {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &content)?;
            tracing::debug!(path = %path.display(), bytes = content.len(), "wrote artifact");
            written.push(WrittenFile {
                key: key.to_string(),
                path,
                bytes: content.len(),
                lines: content.lines().count(),
            });
        }
        Ok(written)
    }
}

/// Map an artifact key to a relative path with only normal components.
pub fn safe_relative_path(key: &str) -> Result<PathBuf> {
    let unsafe_path = || HiveError::UnsafePath {
        key: key.to_string(),
    };
    if key.trim().is_empty() || key.contains('\\') {
        return Err(unsafe_path());
    }
    let mut out = PathBuf::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path())
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(unsafe_path());
    }
    Ok(out)
}
