//! services/api/src/adapters/pdf.rs
//!
//! This module contains the PDF text extraction adapter.
//! It implements the `PdfTextExtractor` port from the `core` crate using `lopdf`.

use async_trait::async_trait;
use lopdf::Document;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use study_assistant_core::domain::PageText;
use study_assistant_core::ports::{PdfTextExtractor, PortError, PortResult};
use tracing::warn;

/// Extracts page text with `lopdf`. Parsing runs on the blocking thread pool.
#[derive(Clone, Default)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Collapses runs of spaces and tabs left behind by glyph positioning.
fn normalize_whitespace(text: &str) -> String {
    static HORIZONTAL_WS: OnceLock<Regex> = OnceLock::new();
    let re = HORIZONTAL_WS.get_or_init(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid regex"));
    text.lines()
        .map(|line| re.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses a PDF held in memory into per-page text.
pub fn extract_pages_from_bytes(bytes: &[u8]) -> PortResult<Vec<PageText>> {
    let document = Document::load_mem(bytes)
        .map_err(|e| PortError::Unexpected(format!("Failed to parse PDF: {e}")))?;
    Ok(extract_document_pages(&document))
}

fn extract_document_pages(document: &Document) -> Vec<PageText> {
    document
        .get_pages()
        .keys()
        .map(|&page_number| {
            let text = match document.extract_text(&[page_number]) {
                Ok(text) => normalize_whitespace(&text),
                Err(e) => {
                    warn!("Could not extract text from page {}: {}", page_number, e);
                    String::new()
                }
            };
            PageText { page_number, text }
        })
        .collect()
}

#[async_trait]
impl PdfTextExtractor for LopdfExtractor {
    async fn extract_pages(&self, path: &Path) -> PortResult<Vec<PageText>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to read {}: {}", path.display(), e)))?;
        tokio::task::spawn_blocking(move || extract_pages_from_bytes(&bytes))
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn one_page_pdf(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn extracts_text_per_page() {
        let pages = extract_pages_from_bytes(&one_page_pdf("Hello Revision")).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
        assert!(pages[0].text.contains("Hello Revision"), "got {:?}", pages[0].text);
    }

    #[test]
    fn non_pdf_bytes_are_an_error() {
        let err = extract_pages_from_bytes(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));
    }

    #[test]
    fn whitespace_runs_are_collapsed() {
        assert_eq!(normalize_whitespace("a   b\t\tc  \n  d "), "a b c\nd");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LopdfExtractor::new()
            .extract_pages(&dir.path().join("absent.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));
    }
}
