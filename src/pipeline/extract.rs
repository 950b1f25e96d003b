//! Text extraction: pull plain text out of the selected PDF pages.
//!
//! Two backends sit behind [`ExtractionMode`]:
//!
//! * `Standard`: `lopdf` decodes each page's content stream and emits the
//!   text-showing operators in stream order.
//! * `Layout`: `pdf-extract` places glyphs by their coordinates, which keeps
//!   reading order intact on multi-column pages.
//!
//! Both parsers are synchronous and CPU-bound, so all work runs inside
//! `tokio::task::spawn_blocking`.

use crate::config::{ExtractionMode, PageSelection};
use crate::error::Pdf2AnkiError;
use crate::output::DocumentInfo;
use lopdf::{Dictionary, Document, Object};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Text of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    pub text: String,
}

/// The text of all selected pages, in page order.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub path: PathBuf,
    pub mode: ExtractionMode,
    /// Page count of the whole document, not just the selection.
    pub total_pages: usize,
    pub pages: Vec<PageText>,
}

impl ExtractedDocument {
    /// Pages joined by a blank line.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// Extract the text of the selected pages.
///
/// Fails with [`Pdf2AnkiError::PageOutOfRange`] when the selection does not
/// hit any page and with [`Pdf2AnkiError::NoTextExtracted`] when the pages
/// only contain whitespace (typically scanned images).
pub async fn extract_text(
    path: &Path,
    mode: ExtractionMode,
    pages: &PageSelection,
) -> Result<ExtractedDocument, Pdf2AnkiError> {
    let path_buf = path.to_path_buf();
    let selection = pages.clone();

    let doc = tokio::task::spawn_blocking(move || extract_blocking(&path_buf, mode, &selection))
        .await
        .map_err(|e| Pdf2AnkiError::ExtractionFailed {
            path: path.to_path_buf(),
            detail: format!("extraction task panicked: {e}"),
        })??;

    if doc.pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(Pdf2AnkiError::NoTextExtracted {
            path: path.to_path_buf(),
        });
    }

    info!(
        "Extracted {} chars from {}/{} pages ({:?})",
        doc.char_count(),
        doc.pages.len(),
        doc.total_pages,
        mode
    );
    Ok(doc)
}

fn extract_blocking(
    path: &Path,
    mode: ExtractionMode,
    selection: &PageSelection,
) -> Result<ExtractedDocument, Pdf2AnkiError> {
    let doc = load_document(path)?;
    let page_ids = doc.get_pages();
    let total_pages = page_ids.len();

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(Pdf2AnkiError::PageOutOfRange {
            selection: selection.to_string(),
            total: total_pages,
        });
    }
    debug!("Reading {} of {} pages", indices.len(), total_pages);

    let pages = match mode {
        ExtractionMode::Standard => indices
            .iter()
            .map(|&idx| {
                let page_num = idx + 1;
                let text = match doc.extract_text(&[page_num as u32]) {
                    Ok(t) => t,
                    Err(e) => {
                        // A single undecodable page should not sink the run.
                        warn!("Page {page_num}: text extraction failed: {e}");
                        String::new()
                    }
                };
                PageText { page_num, text }
            })
            .collect(),
        ExtractionMode::Layout => {
            // pdf-extract always walks the whole document.
            drop(doc);
            let all = pdf_extract::extract_text_by_pages(path).map_err(|e| {
                Pdf2AnkiError::ExtractionFailed {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                }
            })?;
            indices
                .iter()
                .map(|&idx| PageText {
                    page_num: idx + 1,
                    text: all.get(idx).cloned().unwrap_or_default(),
                })
                .collect()
        }
    };

    Ok(ExtractedDocument {
        path: path.to_path_buf(),
        mode,
        total_pages,
        pages,
    })
}

fn load_document(path: &Path) -> Result<Document, Pdf2AnkiError> {
    Document::load(path).map_err(|e| Pdf2AnkiError::ExtractionFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

// ── Metadata ─────────────────────────────────────────────────────────────

/// Read page count, version and the Info dictionary without extracting text.
pub async fn inspect(path: &Path) -> Result<DocumentInfo, Pdf2AnkiError> {
    let path_buf = path.to_path_buf();
    tokio::task::spawn_blocking(move || inspect_blocking(&path_buf))
        .await
        .map_err(|e| Pdf2AnkiError::Internal(format!("inspect task panicked: {e}")))?
}

fn inspect_blocking(path: &Path) -> Result<DocumentInfo, Pdf2AnkiError> {
    let doc = load_document(path)?;
    let info = info_dictionary(&doc);
    let field = |key: &[u8]| info.and_then(|d| string_entry(d, key));

    Ok(DocumentInfo {
        path: path.to_path_buf(),
        page_count: doc.get_pages().len(),
        pdf_version: doc.version.clone(),
        is_encrypted: doc.is_encrypted(),
        title: field(b"Title"),
        author: field(b"Author"),
        subject: field(b"Subject"),
        producer: field(b"Producer"),
    })
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn string_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = dict.get(key).ok()?.as_str().ok()?;
    let s = decode_text_string(bytes);
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise byte-per-char.
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};

    /// Write a minimal PDF with one Courier text line per page.
    fn write_pdf(dir: &Path, pages: &[&str]) -> PathBuf {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Cell Biology"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let path = dir.join("sample.pdf");
        doc.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn extracts_selected_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), &["Alpha page", "Beta page", "Gamma page"]);

        let doc = extract_text(&path, ExtractionMode::Standard, &PageSelection::Range(2, 3))
            .await
            .unwrap();
        assert_eq!(doc.total_pages, 3);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].page_num, 2);
        assert!(doc.pages[0].text.contains("Beta page"));
        let text = doc.text();
        assert!(text.find("Beta").unwrap() < text.find("Gamma").unwrap());
        assert!(!text.contains("Alpha"));
    }

    #[tokio::test]
    async fn out_of_range_selection_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), &["Only page"]);
        let err = extract_text(&path, ExtractionMode::Standard, &PageSelection::Single(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2AnkiError::PageOutOfRange { total: 1, .. }
        ));
    }

    #[tokio::test]
    async fn blank_pages_yield_no_text_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), &["   "]);
        let err = extract_text(&path, ExtractionMode::Standard, &PageSelection::All)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AnkiError::NoTextExtracted { .. }));
    }

    #[tokio::test]
    async fn garbage_file_is_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\nthis is not a pdf body").unwrap();
        let err = extract_text(&path, ExtractionMode::Standard, &PageSelection::All)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AnkiError::ExtractionFailed { .. }));
    }

    #[tokio::test]
    async fn inspect_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), &["One", "Two"]);
        let info = inspect(&path).await.unwrap();
        assert_eq!(info.page_count, 2);
        assert_eq!(info.pdf_version, "1.5");
        assert_eq!(info.title.as_deref(), Some("Cell Biology"));
        assert!(info.author.is_none());
        assert!(!info.is_encrypted);
    }

    #[test]
    fn decodes_utf16_text_strings() {
        let bytes = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_text_string(&bytes), "Hi");
        assert_eq!(decode_text_string(b"Plain"), "Plain");
    }
}
