//! `FileNode`: the assembled, immutable record the path synthesizer consumes.
//!
//! Built once per file by `FileNodeBuilder`, which resolves the file's source
//! root (longest-prefix match against the configured source list), strips an
//! optional "wrapper" directory segment (e.g. a numbered backup-source
//! directory like `src1`), and snapshots the folder actions that apply to
//! every ancestor directory.

use super::category_path::CategoryPath;
use super::folder_action::FolderAction;
use crate::metadata::FileMetadata;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FolderRef {
    pub path: PathBuf,
    pub chain: Vec<String>,
    pub action: Option<FolderAction>,
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub physical_path: PathBuf,
    pub source_root: PathBuf,
    pub source_prefix: Vec<String>,
    pub relative_parts: Vec<String>,
    pub category: CategoryPath,
    pub mime: String,
    pub metadata: FileMetadata,
    pub folder: FolderRef,
    pub folder_actions: HashMap<PathBuf, FolderAction>,
    pub rule_category: Option<CategoryPath>,
    pub ai_category: Option<CategoryPath>,
    pub rule_match_groups: HashMap<String, String>,
    pub classifier_origin: Option<String>,
    pub preview: Option<String>,
}

impl FileNode {
    pub fn relative_dirs(&self) -> &[String] {
        if self.relative_parts.is_empty() {
            &[]
        } else {
            &self.relative_parts[..self.relative_parts.len() - 1]
        }
    }
}

fn strip_empty_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| {
            let s = c.as_os_str().to_string_lossy().to_string();
            if s.is_empty() || s == "/" { None } else { Some(s) }
        })
        .collect()
}

/// Picks the configured source root with the longest matching prefix.
fn resolve_source_root<'a>(path: &Path, sources: &'a [PathBuf]) -> Option<&'a PathBuf> {
    sources
        .iter()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.components().count())
}

/// Walks `physical_path`'s ancestors (from its parent up to the filesystem
/// root) and collects whichever folder actions were decided for them,
/// keyed by absolute ancestor path.
fn folder_actions_for(
    physical_path: &Path,
    action_map: &HashMap<PathBuf, FolderAction>,
) -> HashMap<PathBuf, FolderAction> {
    let mut out = HashMap::new();
    let mut cur = physical_path.parent();
    while let Some(dir) = cur {
        if let Some(action) = action_map.get(dir) {
            out.insert(dir.to_path_buf(), *action);
        }
        cur = dir.parent();
    }
    out
}

pub struct FileNodeBuilder<'a> {
    sources: &'a [PathBuf],
    folder_action_map: &'a HashMap<PathBuf, FolderAction>,
    source_wrapper_pattern: Option<&'a Regex>,
}

pub struct BuildArgs<'a> {
    pub category: CategoryPath,
    pub rule_category: Option<CategoryPath>,
    pub ai_category: Option<CategoryPath>,
    pub mime: String,
    pub metadata: FileMetadata,
    pub rule_match_groups: HashMap<String, String>,
    pub classifier_origin: Option<String>,
    pub preview: Option<&'a str>,
}

impl<'a> FileNodeBuilder<'a> {
    pub fn new(
        sources: &'a [PathBuf],
        folder_action_map: &'a HashMap<PathBuf, FolderAction>,
        source_wrapper_pattern: Option<&'a Regex>,
    ) -> Self {
        Self { sources, folder_action_map, source_wrapper_pattern }
    }

    pub fn build(&self, path: &Path, args: BuildArgs<'_>) -> Option<FileNode> {
        let source_root = resolve_source_root(path, self.sources)?.clone();
        let relative = path.strip_prefix(&source_root).ok()?;
        let mut relative_parts = strip_empty_parts(relative);

        let mut source_prefix = strip_empty_parts(&source_root);
        if let (Some(pattern), Some(first)) = (self.source_wrapper_pattern, relative_parts.first())
        {
            if pattern.is_match(first) {
                source_prefix.push(relative_parts.remove(0));
            }
        }

        let folder_actions = folder_actions_for(path, self.folder_action_map);
        let parent = path.parent().unwrap_or(path);
        let folder = FolderRef {
            path: parent.to_path_buf(),
            chain: relative_parts[..relative_parts.len().saturating_sub(1)].to_vec(),
            action: folder_actions.get(parent).copied(),
        };

        Some(FileNode {
            physical_path: path.to_path_buf(),
            source_root,
            source_prefix,
            relative_parts,
            category: args.category,
            mime: args.mime,
            metadata: args.metadata,
            folder,
            folder_actions,
            rule_category: args.rule_category,
            ai_category: args.ai_category,
            rule_match_groups: args.rule_match_groups,
            classifier_origin: args.classifier_origin,
            preview: args.preview.map(str::to_string),
        })
    }
}

/// A compact JSON-serializable snapshot for the `file_json` catalog column.
pub fn serialize_file_node(node: &FileNode) -> serde_json::Value {
    serde_json::json!({
        "physical_path": node.physical_path.to_string_lossy(),
        "source_root": node.source_root.to_string_lossy(),
        "source_prefix": node.source_prefix,
        "relative_parts": node.relative_parts,
        "category": node.category.to_string(),
        "mime": node.mime,
        "folder_action": node.folder.action.map(|a| a.as_str()),
        "rule_category": node.rule_category.as_ref().map(|c| c.to_string()),
        "ai_category": node.ai_category.as_ref().map(|c| c.to_string()),
        "classifier_origin": node.classifier_origin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_longest_matching_source_root() {
        let sources = vec![PathBuf::from("/a"), PathBuf::from("/a/b")];
        let root = resolve_source_root(Path::new("/a/b/c.txt"), &sources).unwrap();
        assert_eq!(root, &PathBuf::from("/a/b"));
    }

    #[test]
    fn builder_strips_source_wrapper_segment() {
        let sources = vec![PathBuf::from("/sources")];
        let pattern = Regex::new(r"(?i)^src\d+$").unwrap();
        let map = HashMap::new();
        let builder = FileNodeBuilder::new(&sources, &map, Some(&pattern));
        let node = builder
            .build(
                Path::new("/sources/src1/Projects/app/main.rs"),
                BuildArgs {
                    category: CategoryPath::parse("Software/Source_Code").unwrap(),
                    rule_category: None,
                    ai_category: None,
                    mime: "text/x-rust".to_string(),
                    metadata: FileMetadata::new(),
                    rule_match_groups: HashMap::new(),
                    classifier_origin: None,
                    preview: None,
                },
            )
            .unwrap();
        assert_eq!(node.source_prefix, vec!["sources".to_string(), "src1".to_string()]);
        assert_eq!(node.relative_parts, vec!["Projects", "app", "main.rs"]);
    }
}
