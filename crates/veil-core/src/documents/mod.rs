//! Document extraction, rendering and export.
//!
//! A job's life outside the pipeline: pull plain text out of the source file,
//! hand it to the [`RedactionPipeline`], render the redacted text into a fresh
//! DOCX. Output documents are always rebuilt from plain text rather than
//! patched in place, so nothing from the source survives except what the
//! pipeline returned.

pub mod archive;
pub mod docx;
pub mod pdf;
pub mod text;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::{ExtractionError, JobError, RenderError};
use crate::pipeline::RedactionPipeline;

pub use archive::{bundle_zip, DEFAULT_ARCHIVE_NAME};
pub use docx::{DocxExtractor, DocxRenderer};
pub use pdf::PdfExtractor;
pub use text::PlainTextExtractor;

/// Number of source characters kept as a preview on completed jobs.
pub const PREVIEW_CHARS: usize = 100;

/// Prefix of every output file name.
pub const OUTPUT_PREFIX: &str = "anonymized_";

/// A source document: its file name and raw bytes.
///
/// Bytes are shared, so snapshots of a queued job never copy the file.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub name: String,
    pub bytes: Arc<Vec<u8>>,
}

impl DocumentSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }

    /// Read a document from disk, named after its file name.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    /// Lowercased extension, if the name has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// `anonymized_<stem>.<extension>`
    pub fn output_name(&self, extension: &str) -> String {
        format!("{OUTPUT_PREFIX}{}.{extension}", self.stem())
    }
}

/// Turns a source document into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractionError>;
}

/// Turns redacted plain text into an output document.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError>;

    /// Extension of the rendered documents, without the dot.
    fn extension(&self) -> &'static str;
}

/// Extractor that dispatches on the source's file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    /// Extensions with a known extractor.
    pub const SUPPORTED: &'static [&'static str] = &["docx", "pdf", "txt", "md", "text"];

    pub fn supports(path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| Self::SUPPORTED.contains(&e.as_str()))
    }
}

impl TextExtractor for DocumentExtractor {
    fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractionError> {
        match source.extension().as_deref() {
            Some("docx") => DocxExtractor.extract_text(source),
            Some("pdf") => PdfExtractor.extract_text(source),
            Some("txt" | "md" | "text") => PlainTextExtractor.extract_text(source),
            Some(other) => Err(ExtractionError::Unsupported(format!(".{other}"))),
            None => Err(ExtractionError::Unsupported(source.name.clone())),
        }
    }
}

/// What a successfully processed document produced.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedDocument {
    /// Final redacted text
    pub text: String,
    /// Rendered output document
    #[serde(skip)]
    pub document: Arc<Vec<u8>>,
    /// Output file name (`anonymized_<stem>.docx`)
    pub file_name: String,
    /// First characters of the extracted source text
    pub preview: String,
}

/// Extract, redact and render one document.
#[derive(Clone)]
pub struct DocumentProcessor {
    extractor: Arc<dyn TextExtractor>,
    pipeline: RedactionPipeline,
    renderer: Arc<dyn DocumentRenderer>,
}

impl DocumentProcessor {
    /// Processor with the extension-dispatching extractor and DOCX output.
    pub fn new(pipeline: RedactionPipeline) -> Self {
        Self {
            extractor: Arc::new(DocumentExtractor),
            pipeline,
            renderer: Arc::new(DocxRenderer),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn pipeline(&self) -> &RedactionPipeline {
        &self.pipeline
    }

    pub async fn process(&self, source: &DocumentSource) -> Result<RedactedDocument, JobError> {
        let extractor = self.extractor.clone();
        let owned = source.clone();
        let text = tokio::task::spawn_blocking(move || extractor.extract_text(&owned))
            .await
            .map_err(|e| JobError::Internal(format!("extraction task failed: {e}")))??;

        if text.trim().is_empty() {
            return Err(ExtractionError::Empty.into());
        }

        tracing::debug!(
            name = %source.name,
            chars = text.chars().count(),
            "Extracted text"
        );

        let redacted = self.pipeline.run(&text).await?;
        let document = self.renderer.render(&redacted)?;

        Ok(RedactedDocument {
            file_name: source.output_name(self.renderer.extension()),
            preview: text.chars().take(PREVIEW_CHARS).collect(),
            document: Arc::new(document),
            text: redacted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use crate::provider::testing::ScriptedProvider;

    struct FixedText(&'static str);

    impl TextExtractor for FixedText {
        fn extract_text(&self, _source: &DocumentSource) -> Result<String, ExtractionError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_output_name_uses_stem() {
        let source = DocumentSource::new("contract.v2.docx", Vec::new());
        assert_eq!(source.stem(), "contract.v2");
        assert_eq!(source.output_name("docx"), "anonymized_contract.v2.docx");

        let bare = DocumentSource::new("README", Vec::new());
        assert_eq!(bare.output_name("docx"), "anonymized_README.docx");
    }

    #[test]
    fn test_dispatch_by_extension() {
        let txt = DocumentSource::new("Notes.TXT", b"hello".to_vec());
        assert_eq!(DocumentExtractor.extract_text(&txt).unwrap(), "hello");

        let odt = DocumentSource::new("letter.odt", b"whatever".to_vec());
        assert!(matches!(
            DocumentExtractor.extract_text(&odt),
            Err(ExtractionError::Unsupported(ext)) if ext == ".odt"
        ));

        assert!(DocumentExtractor::supports(Path::new("/tmp/a.Docx")));
        assert!(!DocumentExtractor::supports(Path::new("/tmp/a.doc")));
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.md");
        std::fs::write(&path, "# Memo").unwrap();

        let source = DocumentSource::read(&path).unwrap();
        assert_eq!(source.name, "memo.md");
        assert_eq!(source.bytes.as_slice(), b"# Memo");

        assert!(DocumentSource::read(&dir.path().join("missing.txt")).is_err());
    }

    #[tokio::test]
    async fn test_process_renders_docx() {
        let provider = ScriptedProvider::new(|req| Ok(req.input.replace("Petrov", "[NAME]")));
        let pipeline = RedactionPipeline::new(provider, PipelineConfig::without_delays());
        let processor = DocumentProcessor::new(pipeline);

        let source = DocumentSource::new("order.txt", "Signed: Petrov\nDate: today\n".into());
        let result = processor.process(&source).await.unwrap();

        assert_eq!(result.text, "Signed: [NAME]\nDate: today");
        assert_eq!(result.file_name, "anonymized_order.docx");
        assert_eq!(result.preview, "Signed: Petrov\nDate: today\n");

        let rendered = DocumentSource::new("x.docx", result.document.to_vec());
        assert_eq!(
            DocxExtractor.extract_text(&rendered).unwrap(),
            "Signed: [NAME]\nDate: today"
        );
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected_before_pipeline() {
        let provider = ScriptedProvider::new(|req| Ok(req.input.clone()));
        let pipeline = RedactionPipeline::new(provider.clone(), PipelineConfig::without_delays());
        let processor =
            DocumentProcessor::new(pipeline).with_extractor(Arc::new(FixedText(" \n\t")));

        let err = processor
            .process(&DocumentSource::new("blank.docx", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Extraction(ExtractionError::Empty)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_preview_is_truncated_by_chars() {
        let long: &'static str = "Ж".repeat(150).leak();
        let provider = ScriptedProvider::new(|req| Ok(req.input.clone()));
        let pipeline = RedactionPipeline::new(provider, PipelineConfig::without_delays());
        let processor = DocumentProcessor::new(pipeline).with_extractor(Arc::new(FixedText(long)));

        let result = processor
            .process(&DocumentSource::new("long.pdf", Vec::new()))
            .await
            .unwrap();
        assert_eq!(result.preview.chars().count(), PREVIEW_CHARS);
    }
}
