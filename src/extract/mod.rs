//! Content extractor registry (C3): dispatch by MIME to a bounded textual
//! preview, one extractor per format family.
//!
//! Every extractor is pure-Rust; there is no Tesseract/pdfium dependency.
//! `extract_preview` never panics on malformed input — PDF parsing in
//! particular is wrapped in `catch_unwind` because `pdf-extract` (and its
//! font-parsing dependencies) is known to panic on some malformed glyph
//! tables.

mod docx;
mod ebook;
mod email;
mod office;
mod ocr;
mod pdf;
mod plain_text;
mod rtf;

use crate::error::ExtractError;
use std::path::Path;

/// Text is trimmed per-line and collapsed, then capped at this many bytes
/// before being capped again to the caller's configured peek size.
const MAX_EXTRACTED_LENGTH: usize = 500_000;
const MIN_USEFUL_LENGTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    DirectRead,
    NativeText,
    Ocr,
}

#[derive(Debug, Clone)]
pub struct ExtractedPreview {
    pub text: String,
    pub method: ExtractionMethod,
}

/// One pluggable content extractor for a family of MIME types.
pub trait Extractor: Send + Sync {
    /// Whether this extractor claims the given MIME type.
    fn supports(&self, mime: &str) -> bool;

    /// Produce a bounded textual preview, or an error if extraction failed.
    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError>;
}

/// Dispatches a MIME type to the first extractor that claims it.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
    ocr_timeout: std::time::Duration,
}

impl ExtractorRegistry {
    pub fn new(ocr_timeout: std::time::Duration) -> Self {
        let extractors: Vec<Box<dyn Extractor>> = vec![
            Box::new(plain_text::PlainTextExtractor),
            Box::new(pdf::PdfExtractor),
            Box::new(office::SpreadsheetExtractor),
            Box::new(docx::DocxExtractor),
            Box::new(rtf::RtfExtractor),
            Box::new(email::EmailExtractor),
            Box::new(ebook::EbookExtractor),
        ];
        Self { extractors, ocr_timeout }
    }

    /// Extracts a bounded preview for `path`/`mime`, falling back to OCR for
    /// image MIME types when no other extractor applies. Returns `None` if
    /// nothing could be extracted (not an error — callers treat a missing
    /// preview as "no hint", not a failure).
    pub fn preview(&self, path: &Path, mime: &str, max_len: usize) -> Option<String> {
        for extractor in &self.extractors {
            if !extractor.supports(mime) {
                continue;
            }
            match extractor.extract(path) {
                Ok(preview) => return Some(truncate(&preview.text, max_len)),
                Err(err) => {
                    tracing::debug!(mime, path = %path.display(), error = %err, "extractor failed");
                }
            }
        }

        if mime.starts_with("image/") {
            match ocr::extract_with_timeout(path, self.ocr_timeout) {
                Ok(preview) => return Some(truncate(&preview.text, max_len)),
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "ocr extraction failed");
                }
            }
        }

        None
    }
}

/// Shared post-processing: trims each line, drops blanks, joins, caps length.
fn clean_text(text: &str) -> String {
    let cleaned: String = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if cleaned.len() > MAX_EXTRACTED_LENGTH {
        truncate_at_boundary(&cleaned, MAX_EXTRACTED_LENGTH)
    } else {
        cleaned
    }
}

fn truncate_at_boundary(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &text[..end];
    if let Some(pos) = truncated.rfind("\n\n") {
        return truncated[..pos].to_string();
    }
    if let Some(pos) = truncated.rfind(". ") {
        return truncated[..=pos].to_string();
    }
    truncated.to_string()
}

fn truncate(text: &str, max_len: usize) -> String {
    let mut end = max_len.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn ensure_useful(text: String) -> Result<String, ExtractError> {
    if text.trim().len() < MIN_USEFUL_LENGTH {
        Err(ExtractError::Failed("no usable text extracted".to_string()))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn registry_reads_plain_text_by_mime() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hello\nworld").unwrap();
        let registry = ExtractorRegistry::new(std::time::Duration::from_secs(5));
        let preview = registry.preview(file.path(), "text/plain", 1024).unwrap();
        assert_eq!(preview, "hello\nworld");
    }

    #[test]
    fn registry_returns_none_for_unsupported_mime_without_ocr() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00\x01\x02").unwrap();
        let registry = ExtractorRegistry::new(std::time::Duration::from_secs(5));
        assert!(registry.preview(file.path(), "application/octet-stream", 1024).is_none());
    }
}
