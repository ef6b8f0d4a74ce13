//! `CategoryPath`: an ordered, non-empty sequence of category segments.

use std::fmt;

pub const UNKNOWN: &str = "Unknown";

/// A classification path such as `Media/Music` or `Documents/Finance`.
///
/// Segments are case-preserving but every comparison used for lookups goes
/// through a lower-cased key, computed once and cached here so repeated
/// catalog normalization doesn't re-lowercase on every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CategoryPath {
    segments: Vec<String>,
}

impl CategoryPath {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Option<Self> {
        let segments: Vec<String> = segments
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() || segments.iter().any(|s| s.contains('/') || s.contains('\\')) {
            return None;
        }
        Some(Self { segments })
    }

    pub fn unknown() -> Self {
        Self { segments: vec![UNKNOWN.to_string()] }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::new(raw.split('/').map(|s| s.trim().to_string()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn lower_key(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.to_lowercase()).collect()
    }

    /// Returns a new path with one extra trailing segment appended.
    pub fn with_suffix(&self, extra: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(extra.into());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &CategoryPath) -> bool {
        if prefix.segments.len() > self.segments.len() {
            return false;
        }
        prefix
            .lower_key()
            .iter()
            .zip(self.lower_key().iter())
            .all(|(a, b)| a == b)
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slash_separated_path() {
        let p = CategoryPath::parse("Media/Music").unwrap();
        assert_eq!(p.segments(), &["Media", "Music"]);
    }

    #[test]
    fn rejects_empty_path() {
        assert!(CategoryPath::parse("").is_none());
        assert!(CategoryPath::parse("///").is_none());
    }

    #[test]
    fn starts_with_is_case_insensitive() {
        let a = CategoryPath::parse("media/Music/Tagged").unwrap();
        let b = CategoryPath::parse("MEDIA/music").unwrap();
        assert!(a.starts_with(&b));
    }
}
