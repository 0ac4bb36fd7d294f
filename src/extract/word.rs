//! Word (`.docx`) text extraction.
//!
//! A docx is a ZIP archive; the document body lives in
//! `word/document.xml` as `w:t` text runs.

use std::path::Path;

use super::{collect_t_elements, read_zip_entry_bounded, ExtractError, Extractor, MAX_XML_ENTRY_BYTES};

pub struct WordExtractor;

impl Extractor for WordExtractor {
    fn name(&self) -> &'static str {
        "word"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    fn extract_text(&self, _path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
        collect_t_elements(&xml)
    }
}
