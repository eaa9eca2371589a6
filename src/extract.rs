//! Page-level text extraction for PDF and plain-text files.
//!
//! Extraction works on bytes already read from disk so the caller can hash
//! the raw content first and skip unchanged files without parsing them.
//! Failures never panic; they come back as [`RagError::Extraction`] and the
//! ingestion pipeline records them against the file.

use std::path::Path;

use crate::error::{RagError, Result};
use crate::models::Page;

/// Form feed; splits plain-text files into pages when present.
const PAGE_BREAK: char = '\x0c';

/// File formats docqa can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Text,
}

impl FileKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "txt" | "md" | "markdown" => Some(FileKind::Text),
            _ => None,
        }
    }
}

/// Extract ordered, 1-based pages from the raw bytes of the file at `path`.
///
/// Pages whose text is empty after trimming are kept so page numbers stay
/// aligned with the source; callers decide whether an all-empty document is
/// worth indexing.
pub fn extract_pages(path: &Path, bytes: &[u8]) -> Result<Vec<Page>> {
    let kind = FileKind::from_path(path).ok_or_else(|| extraction(path, "unsupported file type"))?;
    let texts = match kind {
        FileKind::Pdf => extract_pdf(path, bytes)?,
        FileKind::Text => extract_plain(path, bytes)?,
    };
    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            number: i as u32 + 1,
            text,
        })
        .collect())
}

fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| extraction(path, format!("PDF extraction failed: {}", e)))
}

fn extract_plain(path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| extraction(path, format!("not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let text = text.replace("\r\n", "\n");
    Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
}

fn extraction(path: &Path, reason: impl Into<String>) -> RagError {
    RagError::Extraction {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
