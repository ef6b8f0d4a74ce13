//! Category catalog and template engine (C1).
//!
//! Parses a category tree plus per-category destination templates from
//! either a CSV (one row per path, trailing `#` comments, a reserved
//! `__default__` fallback row) or a JSON tree (nested objects; `_template`
//! keys attach a template to a node; arrays of strings are leaves). Format is
//! sniffed from the first non-whitespace byte, never the file extension.

use crate::error::CategoriesError;
use crate::models::category_path::CategoryPath;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_TEMPLATE_KEY: &str = "__default__";

#[derive(Debug, Clone, Default)]
pub struct Categories {
    templates: HashMap<Vec<String>, String>,
    known_lower: Vec<Vec<String>>,
    compact_json: String,
}

impl Categories {
    pub fn from_source(raw: &str) -> Result<Self, CategoriesError> {
        let trimmed = raw.trim_start();
        let templates = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            Self::parse_json(raw)?
        } else {
            Self::parse_csv(raw)?
        };

        let known_lower = templates
            .keys()
            .filter(|k| k.as_slice() != [DEFAULT_TEMPLATE_KEY])
            .map(|k| k.iter().map(|s| s.to_lowercase()).collect())
            .collect();

        let compact_json = Self::render_compact_json(&templates);

        Ok(Self { templates, known_lower, compact_json })
    }

    pub fn from_path(path: &Path) -> Result<Self, CategoriesError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CategoriesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(&raw)
    }

    fn parse_csv(raw: &str) -> Result<HashMap<Vec<String>, String>, CategoriesError> {
        let mut out = HashMap::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = strip_comment(line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ',');
            let path_part = parts.next().unwrap_or("").trim();
            let template = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

            if path_part.is_empty() {
                return Err(CategoriesError::EmptyPath { line: line_no + 1, raw: line.to_string() });
            }

            let key: Vec<String> = if path_part == DEFAULT_TEMPLATE_KEY {
                vec![DEFAULT_TEMPLATE_KEY.to_string()]
            } else {
                path_part.split('/').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
            };

            if let Some(template) = template {
                out.insert(key, template);
            } else {
                out.entry(key).or_insert_with(String::new);
            }
        }
        Ok(out)
    }

    fn parse_json(raw: &str) -> Result<HashMap<Vec<String>, String>, CategoriesError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let mut out = HashMap::new();
        Self::walk_json(&value, &mut Vec::new(), &mut out);
        Ok(out)
    }

    fn walk_json(
        value: &serde_json::Value,
        path: &mut Vec<String>,
        out: &mut HashMap<Vec<String>, String>,
    ) {
        match value {
            serde_json::Value::Object(map) => {
                if let Some(serde_json::Value::String(template)) = map.get("_template") {
                    if !path.is_empty() {
                        out.insert(path.clone(), template.clone());
                    }
                }
                for (key, child) in map {
                    if key == "_template" {
                        continue;
                    }
                    path.push(key.clone());
                    Self::walk_json(child, path, out);
                    path.pop();
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    if let serde_json::Value::String(leaf) = item {
                        let mut leaf_path = path.clone();
                        leaf_path.push(leaf.clone());
                        out.entry(leaf_path).or_insert_with(String::new);
                    }
                }
            }
            _ => {}
        }
    }

    fn render_compact_json(templates: &HashMap<Vec<String>, String>) -> String {
        let mut paths: Vec<&Vec<String>> = templates
            .keys()
            .filter(|k| k.as_slice() != [DEFAULT_TEMPLATE_KEY])
            .collect();
        paths.sort();
        let joined: Vec<String> = paths.iter().map(|p| p.join("/")).collect();
        serde_json::to_string(&joined).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn compact_json(&self) -> &str {
        &self.compact_json
    }

    pub fn template_for(&self, category: &CategoryPath) -> Option<&str> {
        self.templates
            .get(&category.segments().to_vec())
            .filter(|t| !t.is_empty())
            .map(String::as_str)
            .or_else(|| self.templates.get(&vec![DEFAULT_TEMPLATE_KEY.to_string()]).map(String::as_str))
    }

    pub fn default_template(&self) -> Option<&str> {
        self.templates.get(&vec![DEFAULT_TEMPLATE_KEY.to_string()]).map(String::as_str)
    }

    /// Like [`Self::template_for`] but never falls back to `__default__` —
    /// used by the path synthesizer to tell "this category has its own
    /// template" apart from "nothing qualifies but there's a fallback".
    pub fn category_specific_template(&self, category: &CategoryPath) -> Option<&str> {
        self.templates.get(&category.segments().to_vec()).filter(|t| !t.is_empty()).map(String::as_str)
    }

    /// Case-insensitive lookup that tolerates exactly one extra trailing
    /// segment beyond a known path (an AI-proposed sub-bucket). Anything
    /// longer is rejected rather than silently truncated.
    pub fn normalize(&self, raw: &str) -> Option<CategoryPath> {
        let candidate = CategoryPath::parse(raw)?;
        let lower = candidate.lower_key();

        if self.known_lower.iter().any(|k| k == &lower) {
            return Some(candidate);
        }

        if lower.len() >= 2 {
            let prefix = &lower[..lower.len() - 1];
            if self.known_lower.iter().any(|k| k.as_slice() == prefix) {
                return Some(candidate);
            }
        }

        None
    }

    /// Scans free-form AI text for the longest known category label as a
    /// substring, used as a fallback when `normalize` can't parse a clean
    /// slash-separated answer out of the reply.
    pub fn find_in_text(&self, text: &str) -> Option<CategoryPath> {
        let lower_text = text.to_lowercase();
        self.known_lower
            .iter()
            .filter(|k| lower_text.contains(&k.join("/")))
            .max_by_key(|k| k.len())
            .and_then(|k| CategoryPath::new(k.clone()))
    }

    pub fn normalize_result(&self, text: &str) -> CategoryPath {
        self.normalize(text)
            .or_else(|| self.find_in_text(text))
            .unwrap_or_else(CategoryPath::unknown)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Replaces `/`, and strips characters that are unsafe in a path component.
pub(crate) fn sanitize_component(value: &str) -> String {
    let replaced = value.replace('/', "_");
    replaced.chars().filter(|c| !"<>:|?*".contains(*c)).collect()
}

fn normalize_for_comparison(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '_' || c == '-' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders a template against metadata, a category, an optional kept path,
/// and a filename. See SPEC_FULL §4.1 for the placeholder grammar.
pub fn render_template(
    template: &str,
    metadata: &HashMap<String, String>,
    category: &CategoryPath,
    kept_path: Option<&str>,
    filename: Option<&str>,
) -> String {
    let mut rendered_values: Vec<String> = Vec::new();
    let mut parts: Vec<String> = category.segments().to_vec();
    let mut inferred_filename: Option<String> = None;

    let template_parts: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    for (idx, raw_part) in template_parts.iter().enumerate() {
        let is_last = idx + 1 == template_parts.len();
        let resolved = resolve_placeholder(raw_part, metadata, kept_path, &rendered_values);
        if resolved.is_empty() {
            continue;
        }
        if is_last && is_filename_like(raw_part) {
            inferred_filename = Some(sanitize_component(&resolved));
            continue;
        }
        rendered_values.push(resolved.clone());
        parts.push(sanitize_component(&resolved));
    }

    let file = inferred_filename.or_else(|| filename.map(sanitize_component)).unwrap_or_default();
    let file = if inferred_filename.is_some() {
        ensure_extension(&file, filename)
    } else {
        file
    };

    if !file.is_empty() {
        parts.push(file);
    }
    parts.join("/")
}

fn is_filename_like(raw_part: &str) -> bool {
    raw_part.contains("{title}")
        || raw_part.contains("{filename}")
        || raw_part.contains("{name}")
}

fn ensure_extension(stem: &str, original_filename: Option<&str>) -> String {
    if stem.contains('.') {
        return stem.to_string();
    }
    let ext = original_filename.and_then(|f| Path::new(f).extension()).and_then(|e| e.to_str());
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

fn resolve_placeholder(
    raw_part: &str,
    metadata: &HashMap<String, String>,
    kept_path: Option<&str>,
    already_rendered: &[String],
) -> String {
    let mut out = String::new();
    let mut chars = raw_part.char_indices().peekable();
    let bytes = raw_part.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = raw_part[i..].find('}') {
                let expr = &raw_part[i + 1..i + end];
                out.push_str(&resolve_expr(expr, metadata, kept_path, already_rendered));
                i += end + 1;
                continue;
            }
        }
        let ch = raw_part[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    let _ = chars.peek();
    out
}

fn resolve_expr(
    expr: &str,
    metadata: &HashMap<String, String>,
    kept_path: Option<&str>,
    already_rendered: &[String],
) -> String {
    let tokens: Vec<&str> = expr.split('|').collect();
    for (idx, token) in tokens.iter().enumerate() {
        let is_last = idx + 1 == tokens.len();
        let token = token.trim();

        if token == "suffix" {
            if let Some(kept) = kept_path {
                let deduped = dedupe_against_rendered(kept, already_rendered);
                if !deduped.is_empty() {
                    return deduped;
                }
            }
            continue;
        }

        if token == "ai_category" {
            if let Some(category) = metadata.get("ai_category") {
                return strip_redundant_category_prefix(category, metadata);
            }
            continue;
        }

        if let Some(value) = metadata.get(token).map(|s| s.trim()).filter(|s| !s.is_empty()) {
            return value.to_string();
        }

        if is_last {
            return token.to_string();
        }
    }
    String::new()
}

fn dedupe_against_rendered(kept: &str, already_rendered: &[String]) -> String {
    let rendered_normalized: Vec<String> =
        already_rendered.iter().map(|v| normalize_for_comparison(v)).collect();
    kept.split('/')
        .filter(|seg| !rendered_normalized.contains(&normalize_for_comparison(seg)))
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_redundant_category_prefix(category: &str, metadata: &HashMap<String, String>) -> String {
    if let Some(base) = metadata.get("category") {
        let prefix = format!("{base}/");
        if category.starts_with(&prefix) {
            return category[prefix.len()..].to_string();
        }
    }
    category.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Categories {
        Categories::from_source(
            "Media/Music,{artist|Unknown Artist}/{album}\nDocuments/Finance\n__default__,{suffix}",
        )
        .unwrap()
    }

    #[test]
    fn sniffs_csv_by_default() {
        let cats = sample();
        assert!(cats.template_for(&CategoryPath::parse("Media/Music").unwrap()).is_some());
    }

    #[test]
    fn sniffs_json_from_leading_brace() {
        let json = r#"{"Media": {"Music": {"_template": "{artist}/{album}"}}}"#;
        let cats = Categories::from_source(json).unwrap();
        assert_eq!(
            cats.template_for(&CategoryPath::parse("Media/Music").unwrap()),
            Some("{artist}/{album}")
        );
    }

    #[test]
    fn normalize_tolerates_one_extra_segment() {
        let cats = sample();
        let result = cats.normalize("Documents/Finance/Invoices").unwrap();
        assert_eq!(result.to_string(), "Documents/Finance/Invoices");
    }

    #[test]
    fn normalize_rejects_two_extra_segments() {
        let cats = sample();
        assert!(cats.normalize("Documents/Finance/Invoices/2023").is_none());
    }

    #[test]
    fn render_template_substitutes_metadata_with_fallback() {
        let mut meta = HashMap::new();
        meta.insert("album".to_string(), "Tagged Album".to_string());
        let rendered = render_template(
            "{artist|Unknown Artist}/{album}",
            &meta,
            &CategoryPath::parse("Media/Music").unwrap(),
            None,
            Some("track.flac"),
        );
        assert_eq!(rendered, "Media/Music/Unknown Artist/Tagged Album/track.flac");
    }

    #[test]
    fn suffix_placeholder_dedupes_against_rendered_segments() {
        let mut meta = HashMap::new();
        meta.insert("artist".to_string(), "Tagged Artist".to_string());
        let rendered = render_template(
            "{artist}/{suffix}",
            &meta,
            &CategoryPath::parse("Media/Music").unwrap(),
            Some("Tagged_Artist/live"),
            Some("track.flac"),
        );
        assert_eq!(rendered, "Media/Music/Tagged Artist/live/track.flac");
    }
}
