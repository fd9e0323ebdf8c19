use super::{DocumentSource, TextExtractor};
use crate::error::ExtractionError;

/// Text extraction from PDF files via lopdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractionError> {
        extract_text_from_bytes(&source.bytes)
    }
}

/// Extract text from PDF bytes, page by page in page order.
///
/// Pages whose content cannot be decoded contribute nothing; a file lopdf
/// cannot parse at all is unreadable.
pub fn extract_text_from_bytes(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::Unreadable(format!("Failed to parse PDF: {e}")))?;

    let mut pages: Vec<u32> = doc.get_pages().keys().cloned().collect();
    pages.sort();

    let mut full_text = String::new();
    let mut skipped = 0usize;

    for page_num in &pages {
        let page_text = match doc.extract_text(&[*page_num]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(page = *page_num, error = %e, "Skipping undecodable page");
                skipped += 1;
                continue;
            }
        };
        full_text.push_str(&page_text);
        if !page_text.ends_with('\n') && !page_text.is_empty() {
            full_text.push('\n');
        }
    }

    tracing::debug!(
        chars = full_text.chars().count(),
        pages = pages.len(),
        skipped,
        "Extracted PDF text"
    );

    Ok(full_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF with one page per entry, each showing its text in Helvetica.
    fn create_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut page_ids = Vec::new();
        for text in page_texts {
            let content = format!(
                "BT /F1 12 Tf 100 700 Td ({}) Tj ET",
                text.replace('\\', "\\\\")
                    .replace('(', "\\(")
                    .replace(')', "\\)")
            );
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            page_ids.push(doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }));
        }

        let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_texts.len() as i64),
        });
        for page_id in &page_ids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", pages_id);
            }
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_extracts_pages_in_order() {
        let bytes = create_pdf(&["Ivanov signed", "Phone 89991234567"]);
        let text = extract_text_from_bytes(&bytes).unwrap();

        let first = text.find("Ivanov").expect("page 1 text");
        let second = text.find("89991234567").expect("page 2 text");
        assert!(first < second, "pages out of order: {text:?}");
    }

    #[test]
    fn test_extractor_reads_source_bytes() {
        let source = DocumentSource::new("scan.pdf", create_pdf(&["Hello World"]));
        let text = PdfExtractor.extract_text(&source).unwrap();
        assert!(text.contains("Hello"), "got: {text:?}");
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let err = extract_text_from_bytes(b"this is not a valid pdf file").unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable(_)));
        assert!(err.to_string().contains("Failed to parse PDF"));
    }

    #[test]
    fn test_empty_file_is_unreadable() {
        assert!(extract_text_from_bytes(&[]).is_err());
    }
}
