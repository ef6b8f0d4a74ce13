//! OCR fallback for image MIME types: shells out to `tesseract` under a
//! hard subprocess timeout, falling back to a second invocation with a
//! different page-segmentation mode if the first run times out or fails.
//! Neither the primary nor secondary engine is bundled with the crate —
//! absence of the binary degrades to "no preview", not a crash.

use super::{clean_text, ensure_useful, ExtractedPreview, ExtractionMethod};
use crate::error::ExtractError;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

/// `--psm 3` (default, fully automatic page segmentation) then `--psm 6`
/// (assume a single uniform block of text) as the secondary pass.
const PRIMARY_PSM: &str = "3";
const SECONDARY_PSM: &str = "6";

pub fn extract_with_timeout(path: &Path, timeout: Duration) -> Result<ExtractedPreview, ExtractError> {
    match run_tesseract(path, PRIMARY_PSM, timeout) {
        Ok(text) => finish(text),
        Err(primary_err) => {
            tracing::debug!(path = %path.display(), error = %primary_err, "primary OCR pass failed, retrying");
            let text = run_tesseract(path, SECONDARY_PSM, timeout)?;
            finish(text)
        }
    }
}

fn finish(text: String) -> Result<ExtractedPreview, ExtractError> {
    let text = ensure_useful(clean_text(&text))?;
    Ok(ExtractedPreview { text, method: ExtractionMethod::Ocr })
}

/// Spawns `tesseract <path> stdout --psm <psm>` and polls it to completion,
/// killing the child (and returning a timeout error) if it overruns.
fn run_tesseract(path: &Path, psm: &str, timeout: Duration) -> Result<String, ExtractError> {
    let mut child = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("--psm")
        .arg(psm)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ExtractError::Failed(format!("failed to spawn tesseract: {e}")))?;

    let deadline = std::time::Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stdout = Vec::new();
                if let Some(mut out) = child.stdout.take() {
                    use std::io::Read;
                    let _ = out.read_to_end(&mut stdout);
                }
                return if status.success() {
                    String::from_utf8(stdout)
                        .map_err(|e| ExtractError::Failed(format!("non-utf8 ocr output: {e}")))
                } else {
                    Err(ExtractError::Failed(format!("tesseract exited with status {:?}", status.code())))
                };
            }
            Ok(None) => {
                if std::time::Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExtractError::Failed(format!("tesseract timed out after {timeout:?}")));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(ExtractError::Failed(format!("failed to poll tesseract: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_degrades_to_error_not_panic() {
        let result = run_tesseract(Path::new("/nonexistent.png"), PRIMARY_PSM, Duration::from_secs(1));
        assert!(result.is_err());
    }
}
