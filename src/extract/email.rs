//! Narrow `.eml` extractor: pulls the common headers plus the first
//! plain-text body part. Handles single-part and simple multipart messages;
//! anything more exotic (nested multiparts, uuencoded attachments) is left
//! to a richer external parser — this is a preview, not a MIME decoder.

use super::{clean_text, ensure_useful, ExtractedPreview, ExtractionMethod, Extractor};
use crate::error::ExtractError;
use std::path::Path;

const HEADERS_OF_INTEREST: &[&str] = &["Subject", "From", "To", "Date"];

pub struct EmailExtractor;

impl Extractor for EmailExtractor {
    fn supports(&self, mime: &str) -> bool {
        mime == "message/rfc822"
    }

    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::Failed(format!("read failed: {e}")))?;

        let (header_block, body) = raw.split_once("\r\n\r\n").or_else(|| raw.split_once("\n\n")).unwrap_or((raw.as_str(), ""));

        let mut out = String::new();
        for line in header_block.lines() {
            if let Some((key, value)) = line.split_once(':') {
                if HEADERS_OF_INTEREST.iter().any(|h| h.eq_ignore_ascii_case(key.trim())) {
                    out.push_str(key.trim());
                    out.push_str(": ");
                    out.push_str(value.trim());
                    out.push('\n');
                }
            }
        }

        let body_text = first_plain_text_part(body);
        out.push('\n');
        out.push_str(&body_text);

        let text = ensure_useful(clean_text(&out))?;
        Ok(ExtractedPreview { text, method: ExtractionMethod::NativeText })
    }
}

/// If the body looks like a multipart message (a `boundary` marker line
/// starting with `--`), returns the text between the first two boundary
/// markers; otherwise returns the body verbatim.
fn first_plain_text_part(body: &str) -> String {
    let boundary_line = body.lines().find(|l| l.trim_start().starts_with("--"));
    let Some(boundary) = boundary_line else {
        return body.to_string();
    };
    let boundary = boundary.trim();
    let parts: Vec<&str> = body.split(boundary).collect();
    parts
        .iter()
        .find(|part| !part.trim().is_empty() && !part.contains("Content-Type: multipart"))
        .map(|part| {
            part.split_once("\r\n\r\n")
                .or_else(|| part.split_once("\n\n"))
                .map(|(_, b)| b.to_string())
                .unwrap_or_else(|| part.to_string())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extracts_subject_and_body_from_simple_message() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Subject: Hello\r\nFrom: a@example.com\r\nX-Mailer: test\r\n\r\nThis is the body.\r\n"
        )
        .unwrap();
        let ex = EmailExtractor;
        let preview = ex.extract(file.path()).unwrap();
        assert!(preview.text.contains("Subject: Hello"));
        assert!(preview.text.contains("This is the body."));
        assert!(!preview.text.contains("X-Mailer"));
    }
}
