//! Document text extraction.
//!
//! Turns a file path or in-memory buffer into plain text plus word/line counts.
//! PDF and DOCX decoding is CPU-bound and runs inside `spawn_blocking`.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::errors::ParserError;

/// Zip-bomb guard for `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Text,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "txt" | "text" | "md" => Some(FileType::Text),
            _ => None,
        }
    }

    /// Sniffs magic bytes: `%PDF` or a zip local header (DOCX). Anything that
    /// is valid UTF-8 is treated as text.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(FileType::Pdf)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Some(FileType::Docx)
        } else if std::str::from_utf8(bytes).is_ok() {
            Some(FileType::Text)
        } else {
            None
        }
    }
}

/// Where the CV comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Buffer {
        bytes: Bytes,
        file_type: Option<FileType>,
    },
}

impl DocumentSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        DocumentSource::Path(path.into())
    }

    pub fn buffer(bytes: impl Into<Bytes>, file_type: Option<FileType>) -> Self {
        DocumentSource::Buffer {
            bytes: bytes.into(),
            file_type,
        }
    }

    /// Short label for logs and batch reports.
    pub fn label(&self) -> String {
        match self {
            DocumentSource::Path(p) => p.display().to_string(),
            DocumentSource::Buffer { bytes, .. } => format!("<buffer {} bytes>", bytes.len()),
        }
    }
}

/// Extracted text. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    text: String,
    word_count: usize,
    line_count: usize,
}

impl ExtractedDocument {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        let line_count = text.lines().count();
        Self {
            text,
            word_count,
            line_count,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }
}

/// Produces text from a document source. Swappable so callers can bring
/// their own OCR or converter.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, source: &DocumentSource) -> Result<ExtractedDocument, ParserError>;
}

/// PDF via `pdf-extract`, DOCX via `zip` + `quick-xml`, plain text as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

#[async_trait]
impl DocumentExtractor for DefaultExtractor {
    async fn extract(&self, source: &DocumentSource) -> Result<ExtractedDocument, ParserError> {
        let (bytes, declared) = match source {
            DocumentSource::Path(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    ParserError::DocumentExtraction(format!("cannot read {}: {e}", path.display()))
                })?;
                (Bytes::from(bytes), type_from_path(path)?)
            }
            DocumentSource::Buffer { bytes, file_type } => (bytes.clone(), *file_type),
        };

        let file_type = declared
            .or_else(|| FileType::sniff(&bytes))
            .ok_or_else(|| {
                ParserError::DocumentExtraction("could not determine the file type".to_string())
            })?;

        let text = tokio::task::spawn_blocking(move || decode(file_type, &bytes))
            .await
            .map_err(|e| ParserError::DocumentExtraction(format!("extraction task failed: {e}")))??;

        if text.trim().is_empty() {
            return Err(ParserError::DocumentExtraction(
                "no text could be extracted from the document".to_string(),
            ));
        }

        let doc = ExtractedDocument::from_text(text);
        debug!(
            "Extracted {:?} document: words={}, lines={}",
            file_type, doc.word_count, doc.line_count
        );
        Ok(doc)
    }
}

/// `None` when the path has no extension; an error for extensions we know we
/// cannot read.
fn type_from_path(path: &Path) -> Result<Option<FileType>, ParserError> {
    match path.extension().and_then(|e| e.to_str()) {
        None => Ok(None),
        Some(ext) => FileType::from_extension(ext).map(Some).ok_or_else(|| {
            ParserError::DocumentExtraction(format!("unsupported file type '.{ext}'"))
        }),
    }
}

fn decode(file_type: FileType, bytes: &[u8]) -> Result<String, ParserError> {
    match file_type {
        FileType::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ParserError::DocumentExtraction(format!("PDF extraction failed: {e}"))),
        FileType::Docx => extract_docx(bytes),
        FileType::Text => String::from_utf8(bytes.to_vec())
            .map_err(|_| ParserError::DocumentExtraction("text file is not valid UTF-8".to_string())),
    }
}

fn docx_error(e: impl std::fmt::Display) -> ParserError {
    ParserError::DocumentExtraction(format!("DOCX extraction failed: {e}"))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ParserError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(docx_error)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| docx_error("word/document.xml not found"))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(docx_error)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(docx_error("word/document.xml exceeds size limit"));
    }
    docx_paragraphs(&xml)
}

/// Concatenates `w:t` runs, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ParserError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            Ok(Event::Text(t)) if in_text => {
                out.push_str(&t.unescape().map_err(docx_error)?);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(docx_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_counts() {
        let doc = ExtractedDocument::from_text("Jane Doe\njane@x.com\n\nSkills: Python, SQL");
        assert_eq!(doc.word_count(), 6);
        assert_eq!(doc.line_count(), 4);
    }

    #[test]
    fn test_sniff_and_extension() {
        assert_eq!(FileType::sniff(b"%PDF-1.7 ..."), Some(FileType::Pdf));
        assert_eq!(FileType::sniff(b"PK\x03\x04rest"), Some(FileType::Docx));
        assert_eq!(FileType::sniff(b"plain"), Some(FileType::Text));
        assert_eq!(FileType::sniff(&[0xff, 0xfe, 0x00]), None);
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("doc"), None);
    }

    #[tokio::test]
    async fn test_text_buffer() {
        let source = DocumentSource::buffer("Jane Doe\nRust engineer", None);
        let doc = DefaultExtractor.extract(&source).await.unwrap();
        assert_eq!(doc.text(), "Jane Doe\nRust engineer");
        assert_eq!(doc.word_count(), 4);
    }

    #[tokio::test]
    async fn test_docx_paragraphs() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Jane Doe</w:t></w:r></w:p>
<w:p><w:r><w:t>Senior </w:t></w:r><w:r><w:t>Engineer &amp; Lead</w:t></w:r></w:p>
</w:body></w:document>"#;
        let source = DocumentSource::buffer(docx_bytes(xml), Some(FileType::Docx));
        let doc = DefaultExtractor.extract(&source).await.unwrap();
        assert_eq!(doc.text(), "Jane Doe\nSenior Engineer & Lead\n");
        assert_eq!(doc.line_count(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.doc");
        std::fs::write(&path, b"binary").unwrap();
        let err = DefaultExtractor
            .extract(&DocumentSource::path(&path))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::DocumentExtraction);
        assert!(err.to_string().contains(".doc"));
    }

    #[tokio::test]
    async fn test_missing_file_and_blank_text() {
        let err = DefaultExtractor
            .extract(&DocumentSource::path("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::DocumentExtraction);

        let blank = DocumentSource::buffer("   \n  ", Some(FileType::Text));
        assert!(DefaultExtractor.extract(&blank).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_pdf_reports_error() {
        let source = DocumentSource::buffer(&b"%PDF-1.4 garbage"[..], None);
        let err = DefaultExtractor.extract(&source).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::DocumentExtraction);
    }
}
