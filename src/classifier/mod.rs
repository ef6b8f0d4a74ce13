//! Classifier trait (C5/C6/C8 shared seam) and its implementations: a
//! rules-only adapter, per-endpoint AI adapters, and a multiplexer that
//! wraps several of either behind the same interface.

pub mod ai;
pub mod multiplexer;
pub mod rules_classifier;

use crate::metadata::FileMetadata;
use crate::models::category_path::CategoryPath;
use crate::models::folder_action::FolderAction;
use async_trait::async_trait;
use std::collections::HashMap;

/// Everything a classifier needs to decide a single file's category.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub name: String,
    pub rel_path: String,
    pub mime: String,
    pub sample: Option<String>,
    pub hint: Option<String>,
    pub metadata: FileMetadata,
}

/// Result of one classification attempt. Carries its own error rather than
/// propagating one — a failed call is still a well-formed answer (the
/// unknown sentinel) from the caller's point of view.
#[derive(Debug, Clone)]
pub struct ClassifyResponse {
    pub category: CategoryPath,
    pub worker: String,
    pub error: Option<String>,
}

impl ClassifyResponse {
    pub fn unknown(worker: impl Into<String>, error: impl Into<String>) -> Self {
        Self { category: CategoryPath::unknown(), worker: worker.into(), error: Some(error.into()) }
    }
}

/// Everything needed to ask for a folder-level keep/disaggregate decision.
#[derive(Debug, Clone)]
pub struct FolderAdviceRequest {
    pub folder_path: String,
    pub total_files: usize,
    pub sample_entries: Vec<String>,
    pub rule_hint: Option<FolderAction>,
}

#[derive(Debug, Clone)]
pub struct FolderAdviceResponse {
    pub action: FolderAction,
    pub worker: String,
    pub error: Option<String>,
}

/// The capability set every classifier — rules-only, a single AI adapter,
/// or a multiplexer of several — implements. A multiplexer can itself be
/// nested behind this trait, though this crate only ever nests one level.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: ClassifyRequest) -> ClassifyResponse;
    async fn advise_folder_action(&self, request: FolderAdviceRequest) -> FolderAdviceResponse;
    async fn close(&self) -> Result<(), String>;
    async fn ensure_available(&self) -> bool;
    fn display_name(&self) -> &str;
    fn is_ai(&self) -> bool;
}

/// Builds the user-message lines shared by both native and OpenAI-compatible
/// adapters: `Filename`/`Path`/`MIME`, an optional `Rule Hint`, up to ten
/// metadata lines (skipping the header-redundant keys), then the content
/// sample.
pub fn build_user_message(request: &ClassifyRequest) -> String {
    let mut lines = vec![
        format!("Filename: {}", request.name),
        format!("Path: {}", request.rel_path),
        format!("MIME: {}", request.mime),
    ];
    if let Some(hint) = &request.hint {
        lines.push(format!("Rule Hint: {hint}"));
    }
    const REDUNDANT: &[&str] = &["filename", "file_stem", "extension"];
    let mut metadata_lines = 0usize;
    for (key, value) in request.metadata.iter() {
        if metadata_lines >= 10 {
            break;
        }
        if REDUNDANT.contains(&key.as_str()) {
            continue;
        }
        lines.push(format!("{key}: {value}"));
        metadata_lines += 1;
    }
    if let Some(sample) = &request.sample {
        lines.push(String::new());
        lines.push(sample.clone());
    }
    lines.join("\n")
}

/// Inlines the category catalog into a user-supplied system prompt template:
/// substitutes `{categories_json}` if present, otherwise appends a labeled
/// block.
pub fn build_system_prompt(template: &str, categories_json: &str) -> String {
    if template.contains("{categories_json}") {
        template.replace("{categories_json}", categories_json)
    } else {
        format!("{template}\n\nCategories JSON: {categories_json}")
    }
}

/// Parses a reply's first `Answer:` line; other lines (`Thought:`,
/// `Reasoning:`) are returned separately for metrics/log capture, never
/// surfaced to the caller as the category.
pub fn parse_reply(content: &str) -> (Option<String>, Vec<String>) {
    let mut answer = None;
    let mut notes = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Answer:") {
            if answer.is_none() {
                answer = Some(rest.trim().to_string());
            }
        } else if trimmed.starts_with("Thought:") || trimmed.starts_with("Reasoning:") {
            notes.push(trimmed.to_string());
        }
    }
    (answer, notes)
}

/// Builds the action-advice prompt body, reused for both folder-advice
/// backend calls. `FolderAction::to_string` (via `Display`) already yields
/// the canonical vocabulary token.
pub fn build_folder_advice_prompt(request: &FolderAdviceRequest) -> String {
    let mut lines = vec![
        format!("Folder: {}", request.folder_path),
        format!("Total files (recursive, capped): {}", request.total_files),
    ];
    if !request.sample_entries.is_empty() {
        lines.push("Sample entries:".to_string());
        for entry in &request.sample_entries {
            lines.push(format!("- {entry}"));
        }
    }
    if let Some(hint) = request.rule_hint {
        lines.push(format!("Rule hint: {hint}"));
    }
    lines.push("Respond with exactly one of: keep, keep_parent, keep_except, disaggregate".to_string());
    lines.join("\n")
}

pub type FolderHintMap = HashMap<String, FolderAction>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_extracts_first_answer_and_keeps_notes_separate() {
        let content = "Thought: looks like a contract\nAnswer: Documents/Legal\nReasoning: filename has 'agreement'";
        let (answer, notes) = parse_reply(content);
        assert_eq!(answer.as_deref(), Some("Documents/Legal"));
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn build_system_prompt_substitutes_placeholder_when_present() {
        let out = build_system_prompt("Use these: {categories_json}", "[\"A\",\"B\"]");
        assert_eq!(out, "Use these: [\"A\",\"B\"]");
    }

    #[test]
    fn build_system_prompt_appends_when_placeholder_absent() {
        let out = build_system_prompt("Classify files.", "[\"A\"]");
        assert!(out.ends_with("Categories JSON: [\"A\"]"));
    }

    #[test]
    fn build_user_message_skips_redundant_metadata_keys() {
        let mut metadata = FileMetadata::new();
        metadata.add("filename", "song.mp3");
        metadata.add("artist", "Test Artist");
        let request = ClassifyRequest {
            name: "song.mp3".to_string(),
            rel_path: "/Music/song.mp3".to_string(),
            mime: "audio/mpeg".to_string(),
            sample: None,
            hint: None,
            metadata,
        };
        let message = build_user_message(&request);
        assert!(message.contains("artist: Test Artist"));
        assert!(!message.contains("filename: song.mp3"));
    }
}
