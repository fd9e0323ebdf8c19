//! Plain text and Markdown sources.

use super::{DocumentSource, TextExtractor};
use crate::error::ExtractionError;

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractionError> {
        let text = std::str::from_utf8(&source.bytes)
            .map_err(|e| ExtractionError::Unreadable(format!("{}: not UTF-8 ({e})", source.name)))?;
        Ok(text.strip_prefix(UTF8_BOM).unwrap_or(text).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bom() {
        let source = DocumentSource::new("a.txt", b"\xEF\xBB\xBFHello\r\nWorld".to_vec());
        assert_eq!(PlainTextExtractor.extract_text(&source).unwrap(), "Hello\r\nWorld");
    }

    #[test]
    fn test_invalid_utf8_is_unreadable() {
        let source = DocumentSource::new("a.txt", vec![0xff, 0xfe, 0x00]);
        let err = PlainTextExtractor.extract_text(&source).unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable(_)));
        assert!(err.to_string().contains("a.txt"));
    }
}
