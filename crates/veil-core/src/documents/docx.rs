//! DOCX (WordprocessingML) reading and writing.
//!
//! Reading keeps text only: one line per paragraph, `w:tab` as a tab and
//! `w:br`/`w:cr` as a line break. Writing produces a minimal package with one
//! paragraph per input line in Times New Roman 12 pt.

use std::io::{Cursor, Read, Write};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{DocumentRenderer, DocumentSource, TextExtractor};
use crate::error::{ExtractionError, RenderError};

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Default, Clone, Copy)]
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractionError> {
        let unreadable = |e: &dyn std::fmt::Display| {
            ExtractionError::Unreadable(format!("{}: {e}", source.name))
        };

        let mut archive =
            ZipArchive::new(Cursor::new(source.bytes.as_slice())).map_err(|e| unreadable(&e))?;
        let mut part = archive.by_name(DOCUMENT_PART).map_err(|e| unreadable(&e))?;
        let mut xml = String::new();
        part.read_to_string(&mut xml).map_err(|e| unreadable(&e))?;

        document_text(&xml).map_err(|e| unreadable(&e))
    }
}

/// Paragraph text of a `word/document.xml` body.
fn document_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => current.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                // Self-closing paragraph
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Text(e) if in_text => current.push_str(&e.unescape()?),
            Event::CData(e) if in_text => current.push_str(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}

/// Renders plain text as a fresh DOCX, one paragraph per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxRenderer;

impl DocumentRenderer for DocxRenderer {
    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(PACKAGE_RELS.as_bytes())?;
        zip.start_file(DOCUMENT_PART, options)?;
        zip.write_all(document_xml(text).as_bytes())?;

        Ok(zip.finish()?.into_inner())
    }

    fn extension(&self) -> &'static str {
        "docx"
    }
}

fn document_xml(text: &str) -> String {
    let mut body = String::with_capacity(text.len() * 2 + 512);
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        body.push_str(r#"<w:p><w:pPr><w:spacing w:after="200"/></w:pPr><w:r>"#);
        body.push_str(RUN_PROPERTIES);
        for (i, segment) in line.split('\t').enumerate() {
            if i > 0 {
                body.push_str("<w:tab/>");
            }
            if !segment.is_empty() {
                body.push_str(r#"<w:t xml:space="preserve">"#);
                body.push_str(&quick_xml::escape::escape(segment));
                body.push_str("</w:t>");
            }
        }
        body.push_str("</w:r></w:p>");
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body>{}{}</w:body></w:document>"
        ),
        body, SECTION_PROPERTIES
    )
}

const RUN_PROPERTIES: &str = concat!(
    r#"<w:rPr><w:rFonts w:ascii="Times New Roman" w:hAnsi="Times New Roman" w:cs="Times New Roman"/>"#,
    r#"<w:sz w:val="24"/><w:szCs w:val="24"/></w:rPr>"#
);

// A4 with 1 inch margins
const SECTION_PROPERTIES: &str = concat!(
    r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/>"#,
    r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/>"#,
    "</w:sectPr>"
);

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    "</Types>"
);

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    "</Relationships>"
);
