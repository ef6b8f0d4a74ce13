//! Direct-read extractor for plain-text-ish MIME types.

use super::{clean_text, ensure_useful, ExtractedPreview, ExtractionMethod, Extractor};
use crate::error::ExtractError;
use std::path::Path;

pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn supports(&self, mime: &str) -> bool {
        mime.starts_with("text/")
            || matches!(
                mime,
                "application/json"
                    | "application/xml"
                    | "application/x-yaml"
                    | "application/toml"
                    | "application/x-sh"
            )
    }

    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::Failed(format!("read failed: {e}")))?;
        let text = ensure_useful(clean_text(&text))?;
        Ok(ExtractedPreview { text, method: ExtractionMethod::DirectRead })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn supports_text_prefixed_mimes() {
        let ex = PlainTextExtractor;
        assert!(ex.supports("text/markdown"));
        assert!(ex.supports("application/json"));
        assert!(!ex.supports("application/pdf"));
    }

    #[test]
    fn extract_trims_and_collapses_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  first  ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "second").unwrap();
        let ex = PlainTextExtractor;
        let preview = ex.extract(file.path()).unwrap();
        assert_eq!(preview.text, "first\nsecond");
    }
}
