//! Word document extraction (`.docx`) via `docx-rs`, walking the parsed
//! document tree for paragraph, hyperlink, and table text.

use super::{clean_text, ensure_useful, ExtractedPreview, ExtractionMethod, Extractor};
use crate::error::ExtractError;
use std::path::Path;

pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn supports(&self, mime: &str) -> bool {
        mime == "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    }

    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::Failed(format!("read failed: {e}")))?;
        let doc = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Failed(format!("parse failed: {e}")))?;

        let mut out = String::new();
        for child in &doc.document.children {
            extract_document_child(child, &mut out);
        }

        let text = ensure_useful(clean_text(&out))?;
        Ok(ExtractedPreview { text, method: ExtractionMethod::NativeText })
    }
}

fn extract_document_child(child: &docx_rs::DocumentChild, out: &mut String) {
    match child {
        docx_rs::DocumentChild::Paragraph(para) => {
            for p_child in &para.children {
                extract_paragraph_child(p_child, out);
            }
            out.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(tr) = row;
                for cell in &tr.cells {
                    let docx_rs::TableRowChild::TableCell(tc) = cell;
                    for cell_child in &tc.children {
                        if let docx_rs::TableCellContent::Paragraph(para) = cell_child {
                            for p_child in &para.children {
                                extract_paragraph_child(p_child, out);
                            }
                            out.push_str(" | ");
                        }
                    }
                }
                out.push('\n');
            }
        }
        _ => {}
    }
}

fn extract_paragraph_child(child: &docx_rs::ParagraphChild, out: &mut String) {
    match child {
        docx_rs::ParagraphChild::Run(run) => {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(text) = run_child {
                    out.push_str(&text.text);
                }
            }
        }
        docx_rs::ParagraphChild::Hyperlink(link) => {
            for inner in &link.children {
                if let docx_rs::ParagraphChild::Run(run) = inner {
                    for run_child in &run.children {
                        if let docx_rs::RunChild::Text(text) = run_child {
                            out.push_str(&text.text);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_docx_mime_only() {
        let ex = DocxExtractor;
        assert!(ex.supports("application/vnd.openxmlformats-officedocument.wordprocessingml.document"));
        assert!(!ex.supports("application/msword"));
    }
}
