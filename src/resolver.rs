//! Folder-action resolver (C7): decides, for every directory on the path
//! from a source root down to a classified file, whether to keep or
//! disaggregate its structure.
//!
//! Folder samples are computed once per batch from the flat file list
//! already in the catalog — no second filesystem walk. Processing then
//! proceeds depth-ascending so a parent's `KEEP` short-circuits every
//! descendant before the classifier chain is ever consulted for them.

use crate::classifier::{Classifier, FolderAdviceRequest};
use crate::models::folder_action::{FolderAction, RequiresAI};
use crate::rules::RuleSet;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

const MAX_SAMPLE_CHILDREN: usize = 48;

#[derive(Debug, Clone)]
pub struct FolderChild {
    pub name: String,
    pub is_dir: bool,
    pub mime: Option<String>,
    pub size: Option<u64>,
    pub file_count: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FolderSample {
    pub path: PathBuf,
    pub children: Vec<FolderChild>,
    pub total_files: u64,
}

/// One row from the catalog's unclassified selection, as seen by the
/// resolver (only the fields it needs).
pub struct ResolverFile<'a> {
    pub path: &'a Path,
    pub mime: &'a str,
}

/// Builds a folder sample for every ancestor directory of every file,
/// capping each sample's visible children at [`MAX_SAMPLE_CHILDREN`]
/// (lexicographically first) while keeping true totals uncapped.
pub fn build_folder_samples(files: &[ResolverFile<'_>]) -> BTreeMap<PathBuf, FolderSample> {
    let mut total_files: HashMap<PathBuf, u64> = HashMap::new();
    let mut chains: Vec<Vec<PathBuf>> = Vec::with_capacity(files.len());

    for file in files {
        let Some(parent) = file.path.parent() else { continue };
        let chain = ancestor_chain(parent);
        for folder in &chain {
            *total_files.entry(folder.clone()).or_insert(0) += 1;
        }
        chains.push(chain);
    }

    let mut children: HashMap<PathBuf, BTreeMap<String, FolderChild>> = HashMap::new();
    for (file, chain) in files.iter().zip(chains.iter()) {
        let Some(parent) = file.path.parent() else { continue };
        let file_name = file.path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        children.entry(parent.to_path_buf()).or_default().entry(file_name.clone()).or_insert_with(|| FolderChild {
            name: file_name,
            is_dir: false,
            mime: Some(file.mime.to_string()),
            size: None,
            file_count: None,
        });

        for window in chain.windows(2) {
            let (ancestor, child_dir) = (&window[0], &window[1]);
            let child_name = child_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            children.entry(ancestor.clone()).or_default().entry(child_name.clone()).or_insert_with(|| FolderChild {
                name: child_name,
                is_dir: true,
                mime: None,
                size: None,
                file_count: None,
            });
        }
    }

    for (folder, entries) in children.iter_mut() {
        for child in entries.values_mut() {
            if child.is_dir {
                let child_path = folder.join(&child.name);
                child.file_count = Some(*total_files.get(&child_path).unwrap_or(&0));
            }
        }
    }

    total_files
        .into_iter()
        .map(|(folder, total)| {
            let capped: Vec<FolderChild> =
                children.get(&folder).map(|m| m.values().take(MAX_SAMPLE_CHILDREN).cloned().collect()).unwrap_or_default();
            (folder.clone(), FolderSample { path: folder, children: capped, total_files: total })
        })
        .collect()
}

/// Every ancestor directory from the topmost non-root component down to
/// (and including) `dir` itself.
fn ancestor_chain(dir: &Path) -> Vec<PathBuf> {
    let mut chain: Vec<PathBuf> = dir.ancestors().map(Path::to_path_buf).collect();
    chain.reverse();
    chain.into_iter().filter(|p| p.parent().is_some() || p == dir).collect()
}

/// Relativizes a folder path against the configured source roots
/// (longest-prefix match) and strips a leading source-wrapper segment, the
/// same convention `FileNodeBuilder` uses for files — so the AI never sees
/// raw absolute disk paths.
pub fn relativize(path: &Path, sources: &[PathBuf], wrapper: Option<&Regex>) -> String {
    let root = sources.iter().filter(|r| path.starts_with(r)).max_by_key(|r| r.components().count());
    let Some(root) = root else {
        return format!("/{}", path.display());
    };
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if let (Some(re), Some(first)) = (wrapper, parts.first()) {
        if re.is_match(first) {
            parts.remove(0);
        }
    }
    format!("/{}", parts.join("/"))
}

pub struct FolderResolver<'a> {
    pub rules: &'a RuleSet,
    pub ai: Option<&'a dyn Classifier>,
    pub sources: &'a [PathBuf],
    pub wrapper: Option<&'a Regex>,
}

impl<'a> FolderResolver<'a> {
    /// Resolves every sampled folder's action, skipping descendants of a
    /// folder already decided `KEEP` (by `persisted` or earlier in this
    /// same pass) per the inheritance short-circuit.
    ///
    /// Folders are processed strictly depth-ascending and one at a time
    /// (never concurrently) because each decision depends on the ones
    /// already made for its ancestors in this same pass.
    pub async fn resolve(
        &self,
        samples: &BTreeMap<PathBuf, FolderSample>,
        persisted: &HashMap<PathBuf, FolderAction>,
    ) -> HashMap<PathBuf, (FolderAction, String)> {
        let mut decided: HashMap<PathBuf, (FolderAction, String)> = HashMap::new();
        let mut folders: Vec<&PathBuf> = samples.keys().collect();
        folders.sort_by_key(|p| p.components().count());

        for folder in folders {
            if self.inherited_keep(folder, persisted, &decided) {
                continue;
            }
            if persisted.contains_key(folder) {
                continue;
            }
            let sample = &samples[folder];
            let (action, source) = self.decide_one(folder, sample).await;
            decided.insert(folder.clone(), (action, source));
        }

        decided
    }

    fn inherited_keep(
        &self,
        folder: &Path,
        persisted: &HashMap<PathBuf, FolderAction>,
        decided: &HashMap<PathBuf, (FolderAction, String)>,
    ) -> bool {
        let mut cur = folder.parent();
        while let Some(dir) = cur {
            let action = decided.get(dir).map(|(a, _)| *a).or_else(|| persisted.get(dir).copied());
            if action == Some(FolderAction::Keep) {
                return true;
            }
            cur = dir.parent();
        }
        false
    }

    async fn decide_one(&self, folder: &Path, sample: &FolderSample) -> (FolderAction, String) {
        let rel = relativize(folder, self.sources, self.wrapper);

        if let Some(reason) = self.find_keep_parent_marker(&rel, sample) {
            return (FolderAction::Keep, reason);
        }

        let (rule_decision, hint) = self.consult_rules(&rel, sample);
        if let Some((action, reason)) = rule_decision {
            return (action, reason);
        }

        if sample.total_files == 0 && sample.children.is_empty() {
            // A dangling ancestor key with no children at all: fall back to
            // whatever the rule chain hinted (matching the empty-folder
            // short-circuit in `classifier::ai::AiAdapter::advise_folder_action`),
            // defaulting to KEEP rather than consulting the AI over nothing.
            return (hint.unwrap_or(FolderAction::Keep), "default:keep:empty_folder".to_string());
        }

        match self.ai {
            Some(ai) => {
                let sample_entries: Vec<String> = sample.children.iter().map(|c| c.name.clone()).collect();
                let response = ai
                    .advise_folder_action(FolderAdviceRequest {
                        folder_path: rel,
                        total_files: sample.total_files as usize,
                        sample_entries,
                        rule_hint: hint,
                    })
                    .await;
                (response.action, format!("ai:{}", response.worker))
            }
            None => (hint.unwrap_or(FolderAction::Disaggregate), "default:disaggregate:rules_only".to_string()),
        }
    }

    fn find_keep_parent_marker(&self, rel: &str, sample: &FolderSample) -> Option<String> {
        for child in &sample.children {
            let child_rel = format!("{}/{}", rel.trim_end_matches('/'), child.name);
            let mime = child.mime.as_deref().unwrap_or("inode/directory");
            for candidate in [child_rel.clone(), format!("{child_rel}/")] {
                if let Some(m) = self.rules.match_path(&candidate, mime) {
                    if m.rule.folder_action == Some(FolderAction::KeepParent) {
                        return Some(format!("rules:keep_parent:line_{}", m.rule.line_number));
                    }
                }
            }
        }
        None
    }

    /// Returns `(Some(decision), _)` on a FINAL rule match, or `(None, hint)`
    /// when the chain only delegates. `hint` is `None` when no rule matched
    /// at all — callers apply their own default (DISAGGREGATE when handing
    /// off to the AI or when there is none; KEEP for a dangling empty
    /// folder) rather than this method picking one for every caller.
    fn consult_rules(&self, rel: &str, sample: &FolderSample) -> (Option<(FolderAction, String)>, Option<FolderAction>) {
        let mut hint = None;

        for candidate in [rel.to_string(), format!("{}/", rel.trim_end_matches('/'))] {
            if let Some(m) = self.rules.match_path(&candidate, "inode/directory") {
                if let Some(action) = m.rule.folder_action {
                    let reason = format!("rules:action:line_{}", m.rule.line_number);
                    if matches!(m.rule.requires_ai, RequiresAI::Final) {
                        return (Some((action, reason)), None);
                    }
                    hint = Some(action);
                }
            }
        }

        for child in &sample.children {
            if child.is_dir {
                continue;
            }
            let child_rel = format!("{}/{}", rel.trim_end_matches('/'), child.name);
            let mime = child.mime.as_deref().unwrap_or("application/octet-stream");
            if let Some(m) = self.rules.match_path(&child_rel, mime) {
                if let Some(action) = m.rule.folder_action {
                    let reason = format!("rules:action:line_{}", m.rule.line_number);
                    if matches!(m.rule.requires_ai, RequiresAI::Final) {
                        return (Some((action, reason)), None);
                    }
                    if hint.is_none() {
                        hint = Some(action);
                    }
                }
            }
        }

        (None, hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::Categories;

    fn categories() -> Categories {
        Categories::from_source("Media/Music\n__default__,").unwrap()
    }

    #[test]
    fn build_folder_samples_counts_total_files_and_children() {
        let p1 = PathBuf::from("/src/Music/Artist/song.mp3");
        let p2 = PathBuf::from("/src/Music/Artist/other.mp3");
        let files = vec![
            ResolverFile { path: &p1, mime: "audio/mpeg" },
            ResolverFile { path: &p2, mime: "audio/mpeg" },
        ];
        let samples = build_folder_samples(&files);
        let artist = samples.get(Path::new("/src/Music/Artist")).unwrap();
        assert_eq!(artist.total_files, 2);
        assert_eq!(artist.children.len(), 2);

        let music = samples.get(Path::new("/src/Music")).unwrap();
        assert_eq!(music.total_files, 2);
        assert_eq!(music.children.len(), 1);
        assert!(music.children[0].is_dir);
        assert_eq!(music.children[0].file_count, Some(2));
    }

    #[tokio::test]
    async fn empty_folder_sample_decides_keep_without_consulting_rules() {
        let rules = RuleSet::load(Path::new("/nonexistent"), &categories()).unwrap();
        let resolver = FolderResolver { rules: &rules, ai: None, sources: &[], wrapper: None };
        let sample = FolderSample { path: PathBuf::from("/a/empty"), children: vec![], total_files: 0 };
        let (action, source) = resolver.decide_one(Path::new("/a/empty"), &sample).await;
        assert_eq!(action, FolderAction::Keep);
        assert_eq!(source, "default:keep:empty_folder");
    }

    #[test]
    fn inherited_keep_short_circuits_descendants() {
        let rules = RuleSet::load(Path::new("/nonexistent"), &categories()).unwrap();
        let resolver = FolderResolver { rules: &rules, ai: None, sources: &[], wrapper: None };
        let mut decided = HashMap::new();
        decided.insert(PathBuf::from("/a"), (FolderAction::Keep, "test".to_string()));
        assert!(resolver.inherited_keep(Path::new("/a/b"), &HashMap::new(), &decided));
        assert!(!resolver.inherited_keep(Path::new("/x/b"), &HashMap::new(), &decided));
    }
}
