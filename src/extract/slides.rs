//! PowerPoint (`.pptx`) text extraction.
//!
//! Slides live under `ppt/slides/slideN.xml`; text runs are DrawingML
//! `a:t` elements. Slides are processed in numeric order and each slide's
//! text is prefixed with a slide header so chunk text keeps provenance.

use std::path::Path;

use super::{collect_t_elements, read_zip_entry_bounded, ExtractError, Extractor, MAX_XML_ENTRY_BYTES};

pub struct SlidesExtractor;

impl Extractor for SlidesExtractor {
    fn name(&self) -> &'static str {
        "slides"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pptx"]
    }

    fn extract_text(&self, _path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

        let mut slide_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        slide_names.sort_by_key(|name| slide_number(name));

        let mut out = String::new();
        for name in slide_names {
            let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
            let text = collect_t_elements(&xml)?;
            if text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&format!("[Slide {}] {}", slide_number(&name), text));
        }
        Ok(out)
    }
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse::<u32>()
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_pptx(slides: &[&str]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (i, text) in slides.iter().enumerate() {
                let xml = format!(
                    r#"<?xml version="1.0"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
                    text
                );
                zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), options)
                    .unwrap();
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn slides_extracted_in_order_with_headers() {
        let bytes = minimal_pptx(&["Welcome", "Pricing", "Contact"]);
        let text = SlidesExtractor
            .extract_text(Path::new("deck.pptx"), &bytes)
            .unwrap();
        assert!(text.contains("[Slide 1] Welcome"));
        assert!(text.contains("[Slide 3] Contact"));
        let pos1 = text.find("Welcome").unwrap();
        let pos2 = text.find("Pricing").unwrap();
        let pos3 = text.find("Contact").unwrap();
        assert!(pos1 < pos2 && pos2 < pos3);
    }

    #[test]
    fn deck_with_no_slides_yields_empty_text() {
        let bytes = minimal_pptx(&[]);
        let text = SlidesExtractor
            .extract_text(Path::new("deck.pptx"), &bytes)
            .unwrap();
        assert!(text.is_empty());
    }
}
