//! Prompt assembly for single-shot and per-file generation calls.

use hive_types::truncate_with_marker;

use crate::stage::{ExpectedFile, StageSpec};

/// One upstream artifact quoted into a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextItem {
    pub key: String,
    pub content: String,
}

impl ContextItem {
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
        }
    }
}

/// Builds prompt text. `context_chars` caps each quoted artifact.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    context_chars: usize,
}

impl PromptBuilder {
    pub fn new(context_chars: usize) -> Self {
        Self { context_chars }
    }

    /// Prompt asking for every file of the stage in one structured response.
    pub fn single_shot(
        &self,
        stage: &StageSpec,
        requirement: &str,
        context: &[ContextItem],
    ) -> String {
        let mut prompt = self.preamble(stage, requirement, context);

        if stage.is_document() {
            prompt.push_str(
                "Return ONLY one JSON object. It must contain these top-level fields: ",
            );
            prompt.push_str(&stage.required_fields.join(", "));
            prompt.push_str(".\n");
        } else {
            prompt.push_str(
                "Return ONLY one JSON object whose keys are exactly the file paths below \
                 and whose values are the complete file contents as strings:\n",
            );
            for file in &stage.files {
                prompt.push_str(&format!("- \"{}\": {}\n", file.key, file.description));
            }
        }
        prompt.push_str("Do not wrap the JSON in commentary.\n");
        prompt
    }

    /// Prompt scoped to exactly one file; the response is its literal content.
    pub fn single_file(
        &self,
        stage: &StageSpec,
        file: &ExpectedFile,
        requirement: &str,
        context: &[ContextItem],
    ) -> String {
        let mut prompt = self.preamble(stage, requirement, context);
        prompt.push_str(&format!(
            "Generate ONLY the file {} ({}).\n",
            file.key, file.description
        ));
        let siblings: Vec<&str> = stage
            .file_keys()
            .filter(|k| *k != file.key)
            .collect();
        if !siblings.is_empty() {
            prompt.push_str(&format!(
                "The other files of this step ({}) are generated separately.\n",
                siblings.join(", ")
            ));
        }
        prompt.push_str("Return ONLY the file content, no markdown and no explanation.\n");
        prompt
    }

    fn preamble(&self, stage: &StageSpec, requirement: &str, context: &[ContextItem]) -> String {
        let mut prompt = format!("{}\n\nREQUIREMENTS:\n{}\n\n", stage.task, requirement.trim());
        for item in context {
            prompt.push_str(&format!(
                "EXISTING {}:\n{}\n\n",
                item.key,
                truncate_with_marker(&item.content, self.context_chars)
            ));
        }
        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(15_000)
    }
}
