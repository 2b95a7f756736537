//! Stage catalog: the ordered stages a run goes through and the files each
//! one is expected to produce.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// What to do when a generation call leaves expected keys or fields without
/// content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Fill each absent key with a placeholder. Never fails the attempt, even
    /// when every key ends up a placeholder.
    Placeholder,
    /// Like `Placeholder`, but an attempt that produced no content at all
    /// fails with `GenerationCallFailed`.
    RequireAny,
    /// Fail the attempt with `IncompleteArtifactSet` on any absent key.
    Fail,
}

/// Shape of a stage's single-shot response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// One structured document stored under the stage's only file key.
    /// Always generated single-shot.
    Document,
    /// An object mapping each expected file key to its content.
    Files,
}

/// One file a stage is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedFile {
    pub key: String,
    pub description: String,
    /// Output budget for this file's own call in chunked mode.
    pub max_output_tokens: u32,
}

impl ExpectedFile {
    pub fn new(key: &str, description: &str, max_output_tokens: u32) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            max_output_tokens,
        }
    }

    /// Final path component, e.g. `models.py`.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// File name without its last extension, e.g. `models`.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(i) => &name[..i],
        }
    }
}

/// A stage that must have succeeded before this one is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prerequisite {
    pub stage: String,
    /// Also require at least one generated (non-placeholder) artifact.
    #[serde(default)]
    pub needs_content: bool,
}

impl Prerequisite {
    fn succeeded(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            needs_content: false,
        }
    }

    fn with_content(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            needs_content: true,
        }
    }
}

// ---------------------------------------------------------------------------
// StageSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub mandatory: bool,
    /// One-line statement of what the stage builds, quoted into prompts.
    pub task: String,
    pub output: OutputShape,
    pub files: Vec<ExpectedFile>,
    /// Top-level fields a [`OutputShape::Document`] response must carry.
    #[serde(default)]
    pub required_fields: Vec<String>,
    pub missing_policy: MissingKeyPolicy,
    /// Output budget for the combined single-shot call.
    pub single_shot_max_tokens: u32,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Upstream stages whose artifacts are quoted into this stage's prompts.
    #[serde(default)]
    pub context_from: Vec<String>,
}

impl StageSpec {
    pub fn is_document(&self) -> bool {
        self.output == OutputShape::Document
    }

    pub fn file_keys(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.key.as_str())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub const SPECIFICATION: &str = "specification";
pub const IMPLEMENTATION: &str = "implementation";
pub const COMPANION: &str = "companion";
pub const VERIFICATION: &str = "verification";
pub const DEPLOYMENT: &str = "deployment";

/// Ordered list of stages. Stages run in this order.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCatalog {
    stages: Vec<StageSpec>,
}

impl StageCatalog {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { stages }
    }

    pub fn get(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StageSpec> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageCatalog {
    fn default() -> Self {
        Self::new(vec![
            specification(),
            implementation(),
            companion(),
            verification(),
            deployment(),
        ])
    }
}

fn specification() -> StageSpec {
    StageSpec {
        name: SPECIFICATION.into(),
        mandatory: true,
        task: "Design the data model and REST API for the application: every entity \
               with its fields and types, the relationships between entities, and every \
               endpoint with method, path and purpose."
            .into(),
        output: OutputShape::Document,
        files: vec![ExpectedFile::new(
            "specification.json",
            "technical specification with entities and endpoints",
            4096,
        )],
        required_fields: vec!["entities".into(), "endpoints".into()],
        missing_policy: MissingKeyPolicy::Fail,
        single_shot_max_tokens: 4096,
        prerequisites: vec![],
        context_from: vec![],
    }
}

fn implementation() -> StageSpec {
    StageSpec {
        name: IMPLEMENTATION.into(),
        mandatory: true,
        task: "Implement the backend service described by the specification.".into(),
        output: OutputShape::Files,
        files: vec![
            ExpectedFile::new(
                "backend/models.py",
                "database models for every entity, including relationships",
                8000,
            ),
            ExpectedFile::new(
                "backend/schemas.py",
                "request and response validation schemas for every entity",
                8000,
            ),
            ExpectedFile::new(
                "backend/routes.py",
                "API route handlers for every endpoint",
                10000,
            ),
            ExpectedFile::new(
                "backend/main.py",
                "application entry point wiring database setup and routes",
                4000,
            ),
        ],
        required_fields: vec![],
        missing_policy: MissingKeyPolicy::Placeholder,
        single_shot_max_tokens: 16000,
        prerequisites: vec![Prerequisite::succeeded(SPECIFICATION)],
        context_from: vec![SPECIFICATION.into()],
    }
}

fn companion() -> StageSpec {
    StageSpec {
        name: COMPANION.into(),
        mandatory: false,
        task: "Build a web frontend that talks to the generated backend API.".into(),
        output: OutputShape::Files,
        files: vec![
            ExpectedFile::new("frontend/package.json", "package manifest with scripts", 2000),
            ExpectedFile::new("frontend/app/layout.tsx", "root layout", 3000),
            ExpectedFile::new(
                "frontend/app/page.tsx",
                "main page listing and editing every entity",
                8000,
            ),
            ExpectedFile::new(
                "frontend/lib/api.ts",
                "typed client for every backend endpoint",
                4000,
            ),
            ExpectedFile::new("frontend/lib/types.ts", "types mirroring the schemas", 3000),
        ],
        required_fields: vec![],
        missing_policy: MissingKeyPolicy::Placeholder,
        single_shot_max_tokens: 12000,
        prerequisites: vec![Prerequisite::with_content(IMPLEMENTATION)],
        context_from: vec![SPECIFICATION.into(), IMPLEMENTATION.into()],
    }
}

fn verification() -> StageSpec {
    StageSpec {
        name: VERIFICATION.into(),
        mandatory: false,
        task: "Write an automated test suite for the generated backend.".into(),
        output: OutputShape::Files,
        files: vec![
            ExpectedFile::new("tests/conftest.py", "shared fixtures and test client", 4000),
            ExpectedFile::new("tests/test_models.py", "model tests", 8000),
            ExpectedFile::new("tests/test_schemas.py", "schema validation tests", 8000),
            ExpectedFile::new("tests/test_routes.py", "endpoint tests", 10000),
        ],
        required_fields: vec![],
        missing_policy: MissingKeyPolicy::Placeholder,
        single_shot_max_tokens: 16000,
        prerequisites: vec![Prerequisite::succeeded(IMPLEMENTATION)],
        context_from: vec![SPECIFICATION.into(), IMPLEMENTATION.into(), COMPANION.into()],
    }
}

fn deployment() -> StageSpec {
    StageSpec {
        name: DEPLOYMENT.into(),
        mandatory: false,
        task: "Produce container and runtime configuration for deploying the application."
            .into(),
        output: OutputShape::Files,
        files: vec![
            ExpectedFile::new("deploy/Dockerfile", "container image for the backend", 2000),
            ExpectedFile::new("deploy/start.sh", "startup script", 1000),
            ExpectedFile::new("deploy/docker-compose.yml", "local compose setup", 2000),
            ExpectedFile::new("deploy/.env.example", "environment variable template", 1000),
            ExpectedFile::new("deploy/README.md", "deployment instructions", 3000),
        ],
        required_fields: vec![],
        missing_policy: MissingKeyPolicy::Placeholder,
        single_shot_max_tokens: 6000,
        prerequisites: vec![Prerequisite::succeeded(SPECIFICATION)],
        context_from: vec![SPECIFICATION.into()],
    }
}
