//! Path synthesizer (C9): turns a classified [`FileNode`] into a canonical
//! destination path under the configured target root.
//!
//! The folder-action resolver (`resolver.rs`) decides the `folder -> action`
//! map ahead of time; this module only *applies* that map to one file's
//! ancestor chain, per the five-step procedure in the component design doc:
//! build a labeled parent-entry list, strip configured/category prefixes,
//! find the keep pivot, pick a template, render.

use crate::categories::{render_template, sanitize_component, Categories};
use crate::models::category_path::CategoryPath;
use crate::models::file_node::FileNode;
use crate::models::folder_action::FolderAction;
use crate::models::path_models::{ClassifiedPath, FullPath};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

struct DirEntry {
    value: String,
    abs_path: PathBuf,
    action: FolderAction,
    explicit: bool,
}

/// Reconstructs the directory chain between the file's source root (plus an
/// optional wrapper segment, already folded into `node.source_prefix` by
/// `FileNodeBuilder`) and its parent, labeling each with the folder action
/// that applies to it. An ancestor absent from `node.folder_actions` was
/// never an explicit decision point — it defaults to `KEEP`, the same
/// default the folder-action resolver's inheritance short-circuit relies on.
fn dir_entries(node: &FileNode) -> Vec<DirEntry> {
    let wanted = node.relative_dirs().len();
    if wanted == 0 {
        return Vec::new();
    }

    let mut ancestors: Vec<PathBuf> = Vec::new();
    let mut cur = node.physical_path.parent();
    while let Some(dir) = cur {
        if dir == node.source_root || !dir.starts_with(&node.source_root) {
            break;
        }
        ancestors.push(dir.to_path_buf());
        cur = dir.parent();
    }
    ancestors.reverse();

    let start = ancestors.len().saturating_sub(wanted);
    ancestors[start..]
        .iter()
        .zip(node.relative_dirs())
        .map(|(abs_path, value)| {
            let explicit = node.folder_actions.get(abs_path).copied();
            DirEntry {
                value: value.clone(),
                abs_path: abs_path.clone(),
                action: explicit.unwrap_or(FolderAction::Keep),
                explicit: explicit.is_some(),
            }
        })
        .collect()
}

/// Consumes a contiguous run of `STRIP_DIRS` entries from the front, then a
/// contiguous run that case-insensitively spells out `category`'s own
/// leading segments (so a tree already laid out by category doesn't
/// duplicate that prefix in the destination).
fn strip_configured_prefix(
    mut entries: Vec<DirEntry>,
    strip_dirs: &[String],
    category: &CategoryPath,
) -> (Vec<String>, Vec<DirEntry>) {
    let strip_lower: Vec<String> = strip_dirs.iter().map(|s| s.to_lowercase()).collect();
    let mut stripped = Vec::new();

    while !entries.is_empty() && strip_lower.contains(&entries[0].value.to_lowercase()) {
        stripped.push(entries.remove(0).value);
    }

    let category_lower = category.lower_key();
    let mut idx = 0;
    while idx < entries.len() && idx < category_lower.len() && entries[idx].value.to_lowercase() == category_lower[idx] {
        idx += 1;
    }
    if idx > 0 {
        stripped.extend(entries.drain(..idx).map(|e| e.value));
    }

    (stripped, entries)
}

/// Splits the remaining entries at the first `KEEP`/`KEEP_EXCEPT` pivot. A
/// `KEEP_EXCEPT` pivot keeps walking afterwards: the first *explicit*
/// `DISAGGREGATE` it meets (i.e. actually decided, not merely defaulted)
/// flips that segment and everything after it back to disaggregated.
fn split_keep_pivot(entries: Vec<DirEntry>) -> (Vec<String>, Vec<String>, &'static str) {
    let pivot = entries
        .iter()
        .position(|e| matches!(e.action, FolderAction::Keep | FolderAction::KeepExcept));

    let Some(pivot) = pivot else {
        return (entries.into_iter().map(|e| e.value).collect(), Vec::new(), "keep");
    };

    let kept_role: &'static str = match entries[pivot].action {
        FolderAction::KeepExcept => "keep_except",
        _ => "keep",
    };

    let mut disaggregated: Vec<String> = entries[..pivot].iter().map(|e| e.value.clone()).collect();
    let mut kept: Vec<String> = Vec::new();
    let mut flipped = false;

    for entry in entries.into_iter().skip(pivot) {
        if !flipped && entry.explicit && matches!(entry.action, FolderAction::Disaggregate) {
            flipped = true;
        }
        if flipped {
            disaggregated.push(entry.value);
        } else {
            kept.push(entry.value);
        }
    }

    (disaggregated, kept, kept_role)
}

pub struct PathSynthesizer<'a> {
    pub categories: &'a Categories,
    pub strip_dirs: &'a [String],
    pub target: &'a Path,
}

impl<'a> PathSynthesizer<'a> {
    pub fn new(categories: &'a Categories, strip_dirs: &'a [String], target: &'a Path) -> Self {
        Self { categories, strip_dirs, target }
    }

    pub fn synthesize(&self, node: &FileNode) -> ClassifiedPath {
        let filename = node
            .relative_parts
            .last()
            .cloned()
            .or_else(|| node.physical_path.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_default();

        let entries = dir_entries(node);
        let (mut extra_prefix, entries) = strip_configured_prefix(entries, self.strip_dirs, &node.category);
        let mut source_prefix = node.source_prefix.clone();
        source_prefix.append(&mut extra_prefix);

        let (disaggregated, kept, kept_role) = split_keep_pivot(entries);

        let category_specific = self.categories.category_specific_template(&node.category);
        let default_template = self.categories.default_template();
        let kept_path = if kept.is_empty() { None } else { Some(kept.join("/")) };
        let mut metadata_map: HashMap<String, String> = node.metadata.to_map().into_iter().collect();
        // `{ai_category}`/`strip_redundant_category_prefix` (categories.rs)
        // read these two keys back out of the metadata map — inject them
        // here rather than have every caller of `render_template` remember to.
        metadata_map.insert("category".to_string(), node.category.to_string());
        if let Some(ai_category) = &node.ai_category {
            metadata_map.insert("ai_category".to_string(), ai_category.to_string());
        }

        // §4.7 step 4: a category-specific template only applies alongside
        // kept segments. With kept segments but no such template, concatenate
        // literally — the placeholder grammar has no way to fan a single
        // resolved value back out into nested directories, so going through
        // it here would flatten a multi-level kept path into one sanitized
        // name. Otherwise fall through to `__default__` (still rendered, for
        // organizational placeholders on flat files) or, with neither, an
        // empty template that reduces to `category/filename`.
        let rendered = match (category_specific, kept.is_empty()) {
            (Some(t), false) => render_template(t, &metadata_map, &node.category, kept_path.as_deref(), Some(&filename)),
            (None, false) => {
                let mut parts: Vec<String> = node.category.segments().to_vec();
                parts.extend(kept.iter().map(|seg| sanitize_component(seg)));
                parts.push(sanitize_component(&filename));
                parts.join("/")
            }
            (_, true) => {
                let template = default_template.unwrap_or("");
                render_template(template, &metadata_map, &node.category, None, Some(&filename))
            }
        };
        let destination = self.target.join(&rendered);

        let full_path = FullPath {
            original: node.physical_path.clone(),
            source_prefix,
            disaggregated,
            kept,
            kept_role,
            file: filename,
        };

        ClassifiedPath::build(destination, node.category.clone(), metadata_map, full_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FileMetadata;
    use crate::models::file_node::{BuildArgs, FileNodeBuilder};

    fn node_with_actions(rel: &str, actions: HashMap<PathBuf, FolderAction>) -> FileNode {
        let sources = vec![PathBuf::from("/sources")];
        let builder = FileNodeBuilder::new(&sources, &actions, None);
        builder
            .build(
                Path::new(&format!("/sources/{rel}")),
                BuildArgs {
                    category: CategoryPath::parse("Documents/Finance").unwrap(),
                    rule_category: None,
                    ai_category: None,
                    mime: "application/pdf".to_string(),
                    metadata: FileMetadata::new(),
                    rule_match_groups: HashMap::new(),
                    classifier_origin: None,
                    preview: None,
                },
            )
            .unwrap()
    }

    #[test]
    fn prefix_disaggregated_and_keep_pivot_preserved() {
        let mut actions = HashMap::new();
        actions.insert(PathBuf::from("/sources/a"), FolderAction::Disaggregate);
        actions.insert(PathBuf::from("/sources/a/b"), FolderAction::Keep);
        let node = node_with_actions("a/b/c/invoice.pdf", actions);

        // No category-specific template: multi-segment kept paths go through
        // the literal-concat branch, which preserves directory nesting (a
        // bare `{suffix}` template would collapse "b/c" into one sanitized
        // component instead).
        let categories = Categories::from_source("Documents/Finance\n").unwrap();
        let strip_dirs: Vec<String> = Vec::new();
        let target = PathBuf::from("/target");
        let synth = PathSynthesizer::new(&categories, &strip_dirs, &target);
        let classified = synth.synthesize(&node);

        assert_eq!(classified.full_path.disaggregated, vec!["a".to_string()]);
        assert_eq!(classified.full_path.kept, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(
            classified.destination(),
            Path::new("/target/Documents/Finance/b/c/invoice.pdf")
        );
    }

    #[test]
    fn strip_dirs_consumed_before_keep_pivot_search() {
        let mut actions = HashMap::new();
        actions.insert(PathBuf::from("/sources/incoming/kept"), FolderAction::Keep);
        let node = node_with_actions("incoming/kept/report.pdf", actions);

        let categories = Categories::from_source("Documents/Finance\n").unwrap();
        let strip_dirs = vec!["incoming".to_string()];
        let target = PathBuf::from("/target");
        let synth = PathSynthesizer::new(&categories, &strip_dirs, &target);
        let classified = synth.synthesize(&node);

        assert!(classified.full_path.source_prefix.contains(&"incoming".to_string()));
        assert_eq!(classified.full_path.kept, vec!["kept".to_string()]);
    }

    #[test]
    fn category_duplicate_prefix_is_not_repeated() {
        let mut actions = HashMap::new();
        actions.insert(PathBuf::from("/sources/Documents/Finance/archive"), FolderAction::Keep);
        let node = node_with_actions("Documents/Finance/archive/w2.pdf", actions);

        // No category-specific template: multi-segment kept paths go through
        // the literal-concat branch, which preserves directory nesting (a
        // bare `{suffix}` template would collapse "b/c" into one sanitized
        // component instead).
        let categories = Categories::from_source("Documents/Finance\n").unwrap();
        let strip_dirs: Vec<String> = Vec::new();
        let target = PathBuf::from("/target");
        let synth = PathSynthesizer::new(&categories, &strip_dirs, &target);
        let classified = synth.synthesize(&node);

        assert_eq!(classified.full_path.kept, vec!["archive".to_string()]);
        assert_eq!(
            classified.destination(),
            Path::new("/target/Documents/Finance/archive/w2.pdf")
        );
    }

    #[test]
    fn keep_except_flips_back_to_disaggregated_on_explicit_override() {
        let mut actions = HashMap::new();
        actions.insert(PathBuf::from("/sources/a"), FolderAction::KeepExcept);
        actions.insert(PathBuf::from("/sources/a/b"), FolderAction::Disaggregate);
        let node = node_with_actions("a/b/c/file.pdf", actions);

        // No category-specific template: multi-segment kept paths go through
        // the literal-concat branch, which preserves directory nesting (a
        // bare `{suffix}` template would collapse "b/c" into one sanitized
        // component instead).
        let categories = Categories::from_source("Documents/Finance\n").unwrap();
        let strip_dirs: Vec<String> = Vec::new();
        let target = PathBuf::from("/target");
        let synth = PathSynthesizer::new(&categories, &strip_dirs, &target);
        let classified = synth.synthesize(&node);

        assert_eq!(classified.full_path.kept, vec!["a".to_string()]);
        assert_eq!(classified.full_path.disaggregated, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn no_kept_segments_and_no_template_falls_back_to_category_filename() {
        // Every ancestor was explicitly decided DISAGGREGATE (not merely
        // defaulted) — a file whose whole chain was ever inherited-KEEP
        // would never reach this branch, since every entry would default
        // to KEEP per the resolver's inheritance short-circuit.
        let mut actions = HashMap::new();
        actions.insert(PathBuf::from("/sources/a"), FolderAction::Disaggregate);
        actions.insert(PathBuf::from("/sources/a/b"), FolderAction::Disaggregate);
        let node = node_with_actions("a/b/file.pdf", actions);

        let categories = Categories::from_source("Documents/Finance\n").unwrap();
        let strip_dirs: Vec<String> = Vec::new();
        let target = PathBuf::from("/target");
        let synth = PathSynthesizer::new(&categories, &strip_dirs, &target);
        let classified = synth.synthesize(&node);

        assert!(classified.full_path.kept.is_empty());
        assert_eq!(classified.destination(), Path::new("/target/Documents/Finance/file.pdf"));
    }
}
