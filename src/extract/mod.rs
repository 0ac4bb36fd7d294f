//! Per-format text extraction.
//!
//! Each supported document format has its own [`Extractor`], registered in
//! an [`ExtractorTable`] keyed by file extension. The ingestion pipeline
//! looks up the extractor for a path and never dispatches on extensions
//! itself. Extraction errors never panic; the pipeline logs them and skips
//! the file.

mod image;
mod pdf;
mod sheet;
mod slides;
mod word;

pub use image::ImageOcrExtractor;
pub use pdf::PdfExtractor;
pub use sheet::SheetExtractor;
pub use slides::SlidesExtractor;
pub use word::WordExtractor;

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection for the OOXML formats).
pub(crate) const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Pdf(String),
    Ooxml(String),
    Ocr(String),
    Io(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(ext) => write!(f, "unsupported format: {}", ext),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Ocr(e) => write!(f, "OCR failed: {}", e),
            ExtractError::Io(e) => write!(f, "I/O error during extraction: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// One document format handled by the pipeline.
///
/// Implementations receive both the path (for tools that read the file
/// themselves, like OCR) and the already-read bytes.
pub trait Extractor: Send + Sync {
    /// Short identifier recorded in the registry, e.g. `"pdf"`.
    fn name(&self) -> &'static str;

    /// Lowercase extensions this extractor claims, without the dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Extract plain UTF-8 text. Empty output is valid here; the pipeline
    /// decides whether an empty document is an error.
    fn extract_text(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Extension-to-extractor dispatch table.
///
/// Built once at startup from the configured capabilities; adding a format
/// means registering one more extractor here, nothing else changes.
pub struct ExtractorTable {
    by_ext: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorTable {
    pub fn new() -> Self {
        Self {
            by_ext: HashMap::new(),
        }
    }

    /// Build the standard table. OCR is registered only when requested and
    /// the `tesseract` binary answers a version probe.
    pub fn with_defaults(want_ocr: bool) -> Self {
        let mut table = Self::new();
        table.register(Arc::new(PdfExtractor));
        table.register(Arc::new(WordExtractor));
        table.register(Arc::new(SlidesExtractor));
        table.register(Arc::new(SheetExtractor));
        if want_ocr {
            if tesseract_available() {
                table.register(Arc::new(ImageOcrExtractor));
            } else {
                info!("tesseract not found on PATH, image OCR disabled");
            }
        }
        table
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for ext in extractor.extensions() {
            self.by_ext.insert(ext.to_string(), extractor.clone());
        }
    }

    /// Look up the extractor for a path by its (lowercased) extension.
    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn Extractor>> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.by_ext.get(&ext)
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_ext.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Log which formats this process can handle. Called once at startup so
    /// operators see missing capabilities before ingestion starts.
    pub fn log_capabilities(&self) {
        info!(
            formats = %self.supported_extensions().join(", "),
            "document extraction capabilities"
        );
    }
}

impl Default for ExtractorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe for the tesseract CLI once at table construction.
fn tesseract_available() -> bool {
    std::process::Command::new("tesseract")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Read a named ZIP entry with a decompressed-size bound.
pub(crate) fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Collect the text content of every `<t>` element in an OOXML part.
/// Both WordprocessingML (`w:t`) and DrawingML (`a:t`) runs resolve to a
/// local name of `t`.
pub(crate) fn collect_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
