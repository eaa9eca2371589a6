//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, index records, retrieval
//! results, and answers that flow through the ingestion and query pipeline.

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for deterministic document and chunk identifiers.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c2e_9d4a_4e7b_8a05_1c9e_2f3d_7a61);

/// Separator inserted between consecutive pages when a document's text is
/// assembled for chunking.
pub const PAGE_SEPARATOR: &str = "\n";

/// One page of extracted text. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

/// A document extracted from a single file.
#[derive(Debug, Clone)]
pub struct Document {
    /// Derived from the source path and content hash.
    pub id: String,
    pub path: String,
    /// SHA-256 hex of the raw file bytes.
    pub content_hash: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(path: impl Into<String>, content_hash: impl Into<String>, pages: Vec<Page>) -> Self {
        let path = path.into();
        let content_hash = content_hash.into();
        Self {
            id: document_id(&path, &content_hash),
            path,
            content_hash,
            pages,
        }
    }

    /// Build a document straight from in-memory text, hashing the text as
    /// its content.
    pub fn from_text(path: impl Into<String>, pages: Vec<Page>) -> Self {
        let mut hasher = Sha256::new();
        for page in &pages {
            hasher.update(page.number.to_le_bytes());
            hasher.update(page.text.as_bytes());
        }
        Self::new(path, format!("{:x}", hasher.finalize()), pages)
    }

    /// Page texts joined with [`PAGE_SEPARATOR`].
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }
}

/// Stored document metadata, without page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub path: String,
    pub content_hash: String,
    pub page_count: u32,
    pub chunk_count: u32,
    pub ingested_at: i64,
}

/// A bounded span of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub text: String,
    /// Char offset of the first character within the document text.
    pub start: usize,
    /// Char offset one past the last character.
    pub end: usize,
    /// Sorted, distinct page numbers the span touches.
    pub pages: Vec<u32>,
}

/// A chunk's vector plus the metadata the index needs to answer queries
/// without touching the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub pages: Vec<u32>,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn new(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            chunk_index: chunk.chunk_index,
            pages: chunk.pages.clone(),
            vector,
        }
    }
}

/// Canonical chunk text as kept by the document store, joined with the
/// owning document's path for attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_path: String,
    pub chunk_index: u32,
    pub text: String,
    pub pages: Vec<u32>,
}

/// One retrieved passage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

/// Passages relevant to a question, in descending score order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub items: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .map(|r| r.chunk.chunk_id.as_str())
            .collect()
    }
}

/// A document that contributed to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub document_id: String,
    pub document_path: String,
    pub pages: Vec<u32>,
}

/// A generated answer with its attribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

/// Stable identifier for a document at `path` with the given content hash.
pub fn document_id(path: &str, content_hash: &str) -> String {
    let name = format!("{}\0{}", path, content_hash);
    Uuid::new_v5(&ID_NAMESPACE, name.as_bytes()).to_string()
}

/// Stable identifier for the chunk of `document_id` starting at char `start`.
pub fn chunk_id(document_id: &str, start: usize) -> String {
    let name = format!("{}:{}", document_id, start);
    Uuid::new_v5(&ID_NAMESPACE, name.as_bytes()).to_string()
}

/// SHA-256 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_depends_on_path_and_content() {
        let a = document_id("a.txt", "h1");
        assert_eq!(a, document_id("a.txt", "h1"));
        assert_ne!(a, document_id("a.txt", "h2"));
        assert_ne!(a, document_id("b.txt", "h1"));
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        assert_eq!(chunk_id("doc", 0), chunk_id("doc", 0));
        assert_ne!(chunk_id("doc", 0), chunk_id("doc", 800));
    }

    #[test]
    fn text_joins_pages() {
        let doc = Document::from_text(
            "x.pdf",
            vec![
                Page {
                    number: 1,
                    text: "one".into(),
                },
                Page {
                    number: 2,
                    text: "two".into(),
                },
            ],
        );
        assert_eq!(doc.text(), "one\ntwo");
    }
}
