//! PDF text extraction via `pdf-extract`.
//!
//! Wrapped in `catch_unwind`: malformed fonts/glyph tables in some PDFs are
//! known to panic inside `pdf-extract`'s CFF parser rather than returning an
//! `Err`, and a single bad PDF must not take down a classification batch.

use super::{clean_text, ensure_useful, ExtractedPreview, ExtractionMethod, Extractor};
use crate::error::ExtractError;
use std::path::Path;

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn supports(&self, mime: &str) -> bool {
        mime == "application/pdf"
    }

    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::Failed(format!("read failed: {e}")))?;

        let extracted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }));

        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => return Err(ExtractError::Failed(format!("pdf extraction failed: {err}"))),
            Err(_) => {
                return Err(ExtractError::Failed(
                    "pdf extraction panicked (likely malformed fonts)".to_string(),
                ))
            }
        };

        let text = ensure_useful(clean_text(&text))?;
        Ok(ExtractedPreview { text, method: ExtractionMethod::NativeText })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_only_pdf_mime() {
        let ex = PdfExtractor;
        assert!(ex.supports("application/pdf"));
        assert!(!ex.supports("application/msword"));
    }
}
