//! Spreadsheet extraction (`.xlsx`/`.xls`) via `calamine`, rendered as a
//! pipe-separated text grid the classifier can skim.

use super::{clean_text, ensure_useful, ExtractedPreview, ExtractionMethod, Extractor};
use crate::error::ExtractError;
use calamine::{open_workbook_auto, Reader};
use std::path::Path;

pub struct SpreadsheetExtractor;

impl Extractor for SpreadsheetExtractor {
    fn supports(&self, mime: &str) -> bool {
        matches!(
            mime,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                | "application/vnd.ms-excel"
        )
    }

    fn extract(&self, path: &Path) -> Result<ExtractedPreview, ExtractError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| ExtractError::Failed(format!("failed to open workbook: {e}")))?;

        let mut all_text = String::new();
        let sheet_names = workbook.sheet_names().to_vec();
        for sheet_name in &sheet_names {
            let Ok(range) = workbook.worksheet_range(sheet_name) else {
                continue;
            };
            all_text.push_str(&format!("=== Sheet: {sheet_name} ===\n"));
            for row in range.rows() {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| cell.to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if !cells.is_empty() {
                    all_text.push_str(&cells.join(" | "));
                    all_text.push('\n');
                }
            }
        }

        let text = ensure_useful(clean_text(&all_text))?;
        Ok(ExtractedPreview { text, method: ExtractionMethod::NativeText })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_xlsx_and_xls() {
        let ex = SpreadsheetExtractor;
        assert!(ex.supports("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"));
        assert!(ex.supports("application/vnd.ms-excel"));
        assert!(!ex.supports("text/csv"));
    }
}
