//! Excel (`.xlsx`) text extraction.
//!
//! Worksheets are processed in numeric order. String cells resolve through
//! the shared-strings table; numeric cells are emitted as their raw value.
//! Per-sheet cell counts are bounded against pathological workbooks.

use std::path::Path;

use super::{read_zip_entry_bounded, ExtractError, Extractor, MAX_XML_ENTRY_BYTES};

const MAX_SHEETS: usize = 100;
const MAX_CELLS_PER_SHEET: usize = 100_000;

pub struct SheetExtractor;

impl Extractor for SheetExtractor {
    fn name(&self) -> &'static str {
        "sheet"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xlsx"]
    }

    fn extract_text(&self, _path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

        let shared_strings = read_shared_strings(&mut archive)?;

        let mut sheet_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        sheet_names.sort_by_key(|name| sheet_number(name));

        let mut out = String::new();
        for name in sheet_names.into_iter().take(MAX_SHEETS) {
            let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
            let cells = extract_sheet_cells(&xml, &shared_strings)?;
            if cells.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&format!("[Sheet {}] {}", sheet_number(&name), cells));
        }
        Ok(out)
    }
}

fn sheet_number(name: &str) -> u32 {
    name.trim_start_matches("xl/worksheets/sheet")
        .trim_end_matches(".xml")
        .parse::<u32>()
        .unwrap_or(u32::MAX)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    // Workbooks with no string cells ship without a shared-strings part.
    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn extract_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    loop {
        if cells.len() >= MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    if cell_is_shared_str {
                        if let Ok(i) = s.parse::<usize>() {
                            if i < shared_strings.len() {
                                cells.push(shared_strings[i].clone());
                            }
                        }
                    } else {
                        cells.push(s.to_string());
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_xlsx(shared: &[&str], sheet_cells: &str) -> Vec<u8> {
        let sst: String = shared
            .iter()
            .map(|s| format!("<si><t>{}</t></si>", s))
            .collect();
        let sst_xml = format!(
            r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{}</sst>"#,
            sst
        );
        let sheet_xml = format!(
            r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            sheet_cells
        );
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            if !shared.is_empty() {
                zip.start_file("xl/sharedStrings.xml", options).unwrap();
                zip.write_all(sst_xml.as_bytes()).unwrap();
            }
            zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
            zip.write_all(sheet_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn shared_strings_resolved() {
        let bytes = minimal_xlsx(
            &["Artwork", "Price"],
            r#"<row><c t="s"><v>0</v></c><c t="s"><v>1</v></c><c><v>4200</v></c></row>"#,
        );
        let text = SheetExtractor
            .extract_text(Path::new("data.xlsx"), &bytes)
            .unwrap();
        assert!(text.contains("Artwork Price 4200"));
        assert!(text.starts_with("[Sheet 1]"));
    }

    #[test]
    fn workbook_without_shared_strings_still_extracts_numbers() {
        let bytes = minimal_xlsx(&[], r#"<row><c><v>17</v></c><c><v>29</v></c></row>"#);
        let text = SheetExtractor
            .extract_text(Path::new("data.xlsx"), &bytes)
            .unwrap();
        assert!(text.contains("17 29"));
    }

    #[test]
    fn out_of_range_shared_index_skipped() {
        let bytes = minimal_xlsx(&["Only"], r#"<row><c t="s"><v>9</v></c></row>"#);
        let text = SheetExtractor
            .extract_text(Path::new("data.xlsx"), &bytes)
            .unwrap();
        assert!(!text.contains("Only"));
    }
}
