//! Storage abstraction for docqa.
//!
//! The [`Store`] trait holds everything that must survive a restart:
//! document metadata, canonical chunk text, and the vector index snapshot.
//! The in-memory [`VectorIndex`](crate::index::VectorIndex) answers queries;
//! the store is where it is loaded from and persisted to.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::index::IndexSnapshot;
use crate::models::{Chunk, DocumentRecord, StoredChunk};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Durable backend for documents, chunks, and index snapshots.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_document_by_path`](Store::find_document_by_path) | Look up the current version of a file |
/// | [`save_document`](Store::save_document) | Replace a document and its chunks atomically |
/// | [`delete_document`](Store::delete_document) | Remove a document and its chunks |
/// | [`list_documents`](Store::list_documents) | Every stored document, by path |
/// | [`get_chunks`](Store::get_chunks) | Canonical chunk text for retrieval |
/// | [`save_snapshot`](Store::save_snapshot) / [`load_snapshot`](Store::load_snapshot) | Vector index persistence |
/// | [`clear`](Store::clear) | Drop everything |
#[async_trait]
pub trait Store: Send + Sync {
    /// The stored document with this source path, if any.
    async fn find_document_by_path(&self, path: &str) -> Result<Option<DocumentRecord>>;

    /// Store `document` with `chunks`, replacing any previous document at
    /// the same path together with its chunks.
    async fn save_document(&self, document: &DocumentRecord, chunks: &[Chunk]) -> Result<()>;

    /// Remove a document and its chunks. Returns the number of chunks removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// All stored documents, ordered by path.
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    /// Chunks for the given ids, in the order requested. Unknown ids are
    /// skipped.
    async fn get_chunks(&self, chunk_ids: &[String]) -> Result<Vec<StoredChunk>>;

    /// Replace the persisted index snapshot.
    async fn save_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()>;

    /// The persisted index snapshot, or `None` if nothing was ever saved.
    async fn load_snapshot(&self) -> Result<Option<IndexSnapshot>>;

    /// Delete every document, chunk, and snapshot record.
    async fn clear(&self) -> Result<()>;
}

/// Encode page numbers for storage as a comma-separated list.
pub(crate) fn encode_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`encode_pages`]. Unparseable entries are dropped.
pub(crate) fn decode_pages(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect()
}
