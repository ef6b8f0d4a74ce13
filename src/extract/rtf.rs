//! Minimal RTF text extraction: strips control words, groups, and escaped
//! braces, keeping only plain-text runs. Good enough for a classification
//! preview; not a full RTF renderer.

use super::{clean_text, ensure_useful, ExtractedPreview, ExtractionMethod, Extractor};
use crate::error::ExtractError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn control_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\[a-zA-Z]+-?\d*\s?|\\'[0-9a-fA-F]{2}|[{}]").unwrap())
}

pub struct RtfExtractor;

impl Extractor for RtfExtractor {
    fn supports(&self, mime: &str) -> bool {
        mime == "application/rtf" || mime == "text/rtf"
    }

    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::Failed(format!("read failed: {e}")))?;
        let stripped = control_word_re().replace_all(&raw, " ");
        let text = ensure_useful(clean_text(&stripped))?;
        Ok(ExtractedPreview { text, method: ExtractionMethod::NativeText })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn strips_control_words_and_braces() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r"{{\rtf1\ansi Hello \b World\b0 !}}").unwrap();
        let ex = RtfExtractor;
        let preview = ex.extract(file.path()).unwrap();
        assert!(preview.text.contains("Hello"));
        assert!(preview.text.contains("World"));
        assert!(!preview.text.contains("\\rtf1"));
    }
}
