//! In-memory [`Store`] implementation for tests and throwaway sessions.
//!
//! Uses `HashMap`s behind a single `std::sync::RwLock`, so every method is
//! atomic with respect to the others.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::index::IndexSnapshot;
use crate::models::{Chunk, DocumentRecord, StoredChunk};

use super::Store;

#[derive(Default)]
struct Inner {
    /// Keyed by document id.
    docs: HashMap<String, DocumentRecord>,
    /// Keyed by chunk id.
    chunks: HashMap<String, Chunk>,
    snapshot: Option<IndexSnapshot>,
}

impl Inner {
    fn remove_document(&mut self, document_id: &str) -> usize {
        self.docs.remove(document_id);
        let before = self.chunks.len();
        self.chunks.retain(|_, c| c.document_id != document_id);
        before - self.chunks.len()
    }
}

/// Volatile store; contents vanish with the process.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_document_by_path(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner.docs.values().find(|d| d.path == path).cloned())
    }

    async fn save_document(&self, document: &DocumentRecord, chunks: &[Chunk]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let stale: Vec<String> = inner
            .docs
            .values()
            .filter(|d| d.path == document.path || d.id == document.id)
            .map(|d| d.id.clone())
            .collect();
        for id in stale {
            inner.remove_document(&id);
        }
        inner.docs.insert(document.id.clone(), document.clone());
        for chunk in chunks {
            inner.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        Ok(inner.remove_document(document_id))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut docs: Vec<DocumentRecord> = inner.docs.values().cloned().collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }

    async fn get_chunks(&self, chunk_ids: &[String]) -> Result<Vec<StoredChunk>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(chunk_ids
            .iter()
            .filter_map(|id| inner.chunks.get(id))
            .filter_map(|c| {
                let doc = inner.docs.get(&c.document_id)?;
                Some(StoredChunk {
                    chunk_id: c.id.clone(),
                    document_id: c.document_id.clone(),
                    document_path: doc.path.clone(),
                    chunk_index: c.chunk_index,
                    text: c.text.clone(),
                    pages: c.pages.clone(),
                })
            })
            .collect())
    }

    async fn save_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<IndexSnapshot>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner.snapshot.clone())
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = Inner::default();
        Ok(())
    }
}
