//! Image OCR via the `tesseract` CLI.
//!
//! Registered only when the binary answers a version probe at startup, so
//! a missing system dependency degrades to "images unsupported" instead of
//! failing every image mid-ingest.

use std::path::Path;
use std::process::Command;

use super::{ExtractError, Extractor};

pub struct ImageOcrExtractor;

impl Extractor for ImageOcrExtractor {
    fn name(&self) -> &'static str {
        "image-ocr"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "tiff", "bmp"]
    }

    fn extract_text(&self, path: &Path, _bytes: &[u8]) -> Result<String, ExtractError> {
        let output = Command::new("tesseract")
            .arg(path)
            .arg("stdout")
            .output()
            .map_err(|e| ExtractError::Ocr(format!("failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
