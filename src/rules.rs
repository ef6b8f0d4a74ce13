//! Rule engine (C2): loads a CSV rule table and matches relative paths and
//! MIME types against it, first match wins.
//!
//! Row format: `path_pattern,mime_pattern,category,folder_action,requires_ai`.
//! Either pattern column may be blank or `*` to mean "match anything". Lines
//! starting with `#` (after stripping leading whitespace) are comments;
//! trailing `#...` on a data line is also stripped. Blank `requires_ai`
//! defaults to `final`.

use crate::categories::Categories;
use crate::error::RulesError;
use crate::models::category_path::CategoryPath;
use crate::models::folder_action::{FolderAction, RequiresAI};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub path_pattern: Option<String>,
    pub mime_pattern: Option<String>,
    pub path_regex: Option<Regex>,
    pub mime_regex: Option<Regex>,
    pub category_path: CategoryPath,
    pub folder_action: Option<FolderAction>,
    pub requires_ai: RequiresAI,
    pub line_number: usize,
}

impl CompiledRule {
    /// Returns `Some` (possibly with both inner matches `None`) if every
    /// configured pattern for this rule matches; `None` otherwise.
    fn try_match(&self, rel_path: &str, mime: &str) -> Option<(Option<regex::Captures<'_>>, Option<regex::Captures<'_>>)> {
        let path_match = match &self.path_regex {
            Some(re) => {
                let m = re.captures(rel_path)?;
                if m.get(0)?.start() != 0 {
                    return None;
                }
                Some(m)
            }
            None => None,
        };
        let mime_match = match &self.mime_regex {
            Some(re) => {
                let m = re.captures(mime)?;
                if m.get(0)?.start() != 0 {
                    return None;
                }
                Some(m)
            }
            None => None,
        };
        Some((path_match, mime_match))
    }
}

pub struct RuleMatch<'a> {
    pub rule: &'a CompiledRule,
    pub named_groups: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct RuleSet {
    pub rules: Vec<CompiledRule>,
    pub load_errors: Vec<String>,
    path: PathBuf,
}

impl RuleSet {
    pub fn load(path: &Path, categories: &Categories) -> Result<Self, RulesError> {
        let mut set = RuleSet { rules: Vec::new(), load_errors: Vec::new(), path: path.to_path_buf() };

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                set.log_error(0, &format!("rules file not found: {}", path.display()), None);
                return Ok(set);
            }
            Err(source) => return Err(RulesError::Io { path: path.to_path_buf(), source }),
        };

        for (idx, raw_line) in raw.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let line = match trimmed.find('#') {
                Some(pos) => trimmed[..pos].trim(),
                None => trimmed,
            };
            if line.is_empty() {
                continue;
            }

            set.load_row(line_no, line, categories);
        }

        Ok(set)
    }

    fn load_row(&mut self, line_no: usize, line: &str, categories: &Categories) {
        let mut cols: Vec<String> = parse_csv_row(line);
        while cols.len() < 5 {
            cols.push(String::new());
        }
        let path_pat = cols[0].trim().to_string();
        let mime_pat = cols[1].trim().to_string();
        let category_raw = cols[2].trim().to_string();
        let action_raw = cols[3].trim().to_string();
        let ai_flag_raw = cols[4].trim().to_string();

        if category_raw.is_empty() {
            self.log_error(line_no, "missing category", Some(line));
            return;
        }

        let path_pat_norm = normalize_pattern(&path_pat);
        let mime_pat_norm = normalize_pattern(&mime_pat);

        let path_regex = match path_pat_norm.as_deref().map(compile_anchored) {
            Some(Ok(re)) => Some(re),
            Some(Err(err)) => {
                self.log_error(line_no, &format!("invalid path regex '{path_pat}': {err}"), Some(line));
                return;
            }
            None => None,
        };

        let mime_regex = match mime_pat_norm.as_deref().map(compile_anchored) {
            Some(Ok(re)) => Some(re),
            Some(Err(err)) => {
                self.log_error(line_no, &format!("invalid mime regex '{mime_pat}': {err}"), Some(line));
                return;
            }
            None => None,
        };

        let folder_action = if action_raw.is_empty() {
            None
        } else {
            match action_raw.parse::<FolderAction>() {
                Ok(a) => Some(a),
                Err(err) => {
                    self.log_error(line_no, &err.to_string(), Some(line));
                    return;
                }
            }
        };

        let ai_flag_norm = if ai_flag_raw.is_empty() { "final".to_string() } else { ai_flag_raw.to_lowercase() };
        let requires_ai = match ai_flag_norm.parse::<RequiresAI>() {
            Ok(r) => r,
            Err(err) => {
                self.log_error(line_no, &err.to_string(), Some(line));
                return;
            }
        };

        let category_path = match categories.normalize(&category_raw) {
            Some(cp) => cp,
            None => {
                self.log_error(line_no, &format!("unknown category path '{category_raw}'"), Some(line));
                return;
            }
        };

        self.rules.push(CompiledRule {
            path_pattern: path_pat_norm,
            mime_pattern: mime_pat_norm,
            path_regex,
            mime_regex,
            category_path,
            folder_action,
            requires_ai,
            line_number: line_no,
        });
    }

    fn log_error(&mut self, line: usize, message: &str, raw: Option<&str>) {
        let mut entry = format!("{}:{line}: {message}", self.path.display());
        if let Some(raw) = raw {
            entry.push_str(&format!(" | {raw}"));
        }
        tracing::warn!(file = %self.path.display(), line, message, "rule load error");
        self.load_errors.push(entry);
    }

    pub fn has_errors(&self) -> bool {
        !self.load_errors.is_empty()
    }

    /// First-match-wins lookup against a rooted relative path (a leading `/`
    /// is added if missing, matching the canonical rule-path convention).
    pub fn match_path(&self, rel_path: &str, mime: &str) -> Option<RuleMatch<'_>> {
        let mut rooted = rel_path.to_string();
        if !rooted.starts_with('/') {
            rooted = format!("/{rooted}");
        }
        for rule in &self.rules {
            if let Some((path_match, mime_match)) = rule.try_match(&rooted, mime) {
                let mut named_groups = HashMap::new();
                if let Some(m) = &path_match {
                    collect_named_groups(rule.path_regex.as_ref(), m, &mut named_groups);
                }
                if let Some(m) = &mime_match {
                    collect_named_groups_missing_only(rule.mime_regex.as_ref(), m, &mut named_groups);
                }
                return Some(RuleMatch { rule, named_groups });
            }
        }
        None
    }
}

fn collect_named_groups(re: Option<&Regex>, caps: &regex::Captures<'_>, out: &mut HashMap<String, String>) {
    if let Some(re) = re {
        for name in re.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                out.insert(name.to_string(), m.as_str().to_string());
            }
        }
    }
}

fn collect_named_groups_missing_only(re: Option<&Regex>, caps: &regex::Captures<'_>, out: &mut HashMap<String, String>) {
    if let Some(re) = re {
        for name in re.capture_names().flatten() {
            if out.contains_key(name) {
                continue;
            }
            if let Some(m) = caps.name(name) {
                out.insert(name.to_string(), m.as_str().to_string());
            }
        }
    }
}

fn normalize_pattern(pat: &str) -> Option<String> {
    if pat.is_empty() || pat == "*" {
        None
    } else {
        Some(pat.to_string())
    }
}

fn compile_anchored(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Minimal CSV splitter handling double-quoted fields with `""` escapes —
/// rule rows are simple enough that a full CSV crate would be overkill.
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut cur));
            }
            other => cur.push(other),
        }
    }
    fields.push(cur);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn categories() -> Categories {
        Categories::from_source("Media/Music\nDocuments/Finance\n__default__,").unwrap()
    }

    #[test]
    fn loads_rules_and_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, r"^/Music/.*,audio/.*,Media/Music,keep,final").unwrap();
        let set = RuleSet::load(file.path(), &categories()).unwrap();
        assert_eq!(set.rules.len(), 1);
        assert!(!set.has_errors());
    }

    #[test]
    fn first_match_wins_and_defaults_requires_ai_to_final() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r"^/Music/.*,*,Media/Music,keep,").unwrap();
        writeln!(file, r"*,*,Documents/Finance,,").unwrap();
        let set = RuleSet::load(file.path(), &categories()).unwrap();
        let m = set.match_path("/Music/song.flac", "audio/flac").unwrap();
        assert_eq!(m.rule.category_path.to_string(), "Media/Music");
        assert_eq!(m.rule.requires_ai, RequiresAI::Final);
    }

    #[test]
    fn unknown_category_is_rejected_with_load_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "*,*,Nonexistent/Category,,").unwrap();
        let set = RuleSet::load(file.path(), &categories()).unwrap();
        assert!(set.rules.is_empty());
        assert!(set.has_errors());
    }

    #[test]
    fn missing_rules_file_yields_empty_set_with_error_not_failure() {
        let set = RuleSet::load(Path::new("/nonexistent/rules.csv"), &categories()).unwrap();
        assert!(set.rules.is_empty());
        assert!(set.has_errors());
    }
}
