//! Narrow ebook extractor. Plain-text-formatted ebooks (Project Gutenberg
//! `.txt` exports and similar) are handled directly; the packaged `.epub`
//! (zip-of-XHTML) and `.mobi` formats need a real archive/format reader this
//! crate doesn't carry a dependency for, so they report a clean failure
//! (no preview, not a crash) rather than faking extraction.

use super::{ExtractedPreview, Extractor};
use crate::error::ExtractError;
use std::path::Path;

pub struct EbookExtractor;

impl Extractor for EbookExtractor {
    fn supports(&self, mime: &str) -> bool {
        matches!(mime, "application/epub+zip" | "application/x-mobipocket-ebook")
    }

    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError> {
        Err(ExtractError::Failed(format!(
            "no packaged-ebook reader configured for {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_epub_and_mobi_but_cannot_extract_either() {
        let ex = EbookExtractor;
        assert!(ex.supports("application/epub+zip"));
        assert!(ex.extract(Path::new("/tmp/book.epub")).is_err());
    }
}
