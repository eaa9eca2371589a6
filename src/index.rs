//! In-memory vector index with durable snapshots.
//!
//! [`VectorIndex`] owns every [`EmbeddingRecord`] and answers exact
//! nearest-neighbour queries by brute-force cosine similarity. The metric and
//! the dimensionality are fixed for the lifetime of an index.
//!
//! # Concurrency
//!
//! The index follows a single-writer / multi-reader discipline. Readers take
//! a cheap `Arc` snapshot of the current state and never wait on each other.
//! Writers serialize on a mutex, build the next state off to the side, and
//! swap it in with one pointer store. A batch is therefore visible to
//! queries in full or not at all; a batch that fails validation leaves the
//! previous state untouched.
//!
//! # Persistence
//!
//! [`VectorIndex::persist`] writes a snapshot (vectors, chunk ids, minimal
//! metadata) through a [`Store`]; [`VectorIndex::load`] restores it, treating
//! an empty store as an empty index.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::EmbeddingRecord;
use crate::store::Store;

/// The only similarity metric an index uses.
pub const METRIC: &str = "cosine";

/// One query result.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
}

/// A record plus its insertion position, as written to durable storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub record: EmbeddingRecord,
    pub position: u64,
}

/// Durable form of a whole index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub dims: usize,
    pub metric: String,
    pub records: Vec<SnapshotRecord>,
}

#[derive(Debug, Clone)]
struct Entry {
    record: EmbeddingRecord,
    /// Insertion order; breaks score ties.
    position: u64,
}

impl Entry {
    fn new(record: EmbeddingRecord, position: u64) -> Self {
        Self { record, position }
    }
}

#[derive(Debug, Clone, Default)]
struct IndexState {
    entries: Vec<Entry>,
    by_chunk: HashMap<String, usize>,
    next_position: u64,
}

impl IndexState {
    fn rebuild_lookup(&mut self) {
        self.by_chunk = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.record.chunk_id.clone(), i))
            .collect();
    }

    fn upsert(&mut self, record: EmbeddingRecord) {
        match self.by_chunk.get(&record.chunk_id) {
            Some(&i) => {
                let position = self.entries[i].position;
                self.entries[i] = Entry::new(record, position);
            }
            None => {
                let position = self.next_position;
                self.next_position += 1;
                self.by_chunk
                    .insert(record.chunk_id.clone(), self.entries.len());
                self.entries.push(Entry::new(record, position));
            }
        }
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.record.document_id != document_id);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rebuild_lookup();
        }
        removed
    }
}

/// Exact cosine-similarity index over embedding records.
#[derive(Debug)]
pub struct VectorIndex {
    dims: usize,
    state: RwLock<Arc<IndexState>>,
    writer: Mutex<()>,
}

impl VectorIndex {
    /// An empty index accepting vectors of length `dims`.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            state: RwLock::new(Arc::new(IndexState::default())),
            writer: Mutex::new(()),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.snapshot_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records belonging to `document_id`.
    pub fn document_len(&self, document_id: &str) -> usize {
        self.snapshot_state()
            .entries
            .iter()
            .filter(|e| e.record.document_id == document_id)
            .count()
    }

    /// Insert or replace records by chunk id. All or nothing.
    pub fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        self.check_dims(&records)?;
        if records.is_empty() {
            return Ok(());
        }
        self.write(|state| {
            for record in records {
                state.upsert(record);
            }
        });
        Ok(())
    }

    /// Remove every record of `document_id` and insert `records` in one
    /// atomic step.
    pub fn replace_document(&self, document_id: &str, records: Vec<EmbeddingRecord>) -> Result<()> {
        self.check_dims(&records)?;
        self.write(|state| {
            state.remove_document(document_id);
            for record in records {
                state.upsert(record);
            }
        });
        Ok(())
    }

    /// Remove every record of `document_id`, returning how many were removed.
    pub fn delete_by_document(&self, document_id: &str) -> usize {
        let mut removed = 0;
        self.write(|state| removed = state.remove_document(document_id));
        removed
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.write(|state| *state = IndexState::default());
    }

    /// The `k` records most similar to `vector`, best first. Equal scores
    /// keep insertion order.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if vector.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        let state = self.snapshot_state();
        if k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Entry)> = state
            .entries
            .iter()
            .map(|e| (cosine_similarity(vector, &e.record.vector), e))
            .collect();

        scored.sort_by(|(sa, ea), (sb, eb)| {
            sb.total_cmp(sa)
                .then_with(|| ea.position.cmp(&eb.position))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| IndexHit {
                chunk_id: e.record.chunk_id.clone(),
                document_id: e.record.document_id.clone(),
                score,
            })
            .collect())
    }

    /// Every record currently visible to queries, in insertion order.
    pub fn records(&self) -> Vec<EmbeddingRecord> {
        self.snapshot().records.into_iter().map(|r| r.record).collect()
    }

    /// Point-in-time copy of every record, in insertion order.
    pub fn snapshot(&self) -> IndexSnapshot {
        let state = self.snapshot_state();
        let mut records: Vec<SnapshotRecord> = state
            .entries
            .iter()
            .map(|e| SnapshotRecord {
                record: e.record.clone(),
                position: e.position,
            })
            .collect();
        records.sort_by_key(|r| r.position);
        IndexSnapshot {
            dims: self.dims,
            metric: METRIC.to_string(),
            records,
        }
    }

    /// Rebuild an index from a snapshot, validating it against `dims`.
    pub fn from_snapshot(snapshot: IndexSnapshot, dims: usize) -> Result<Self> {
        if snapshot.metric != METRIC {
            return Err(RagError::Config(format!(
                "index snapshot uses metric '{}', only '{}' is supported; re-index required",
                snapshot.metric, METRIC
            )));
        }
        let index = Self::new(dims);
        if snapshot.records.is_empty() {
            return Ok(index);
        }
        if snapshot.dims != dims {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: snapshot.dims,
            });
        }

        let mut records = snapshot.records;
        records.sort_by_key(|r| r.position);
        let records: Vec<EmbeddingRecord> = records.into_iter().map(|r| r.record).collect();
        index.check_dims(&records)?;

        index.write(|state| {
            for record in records {
                state.upsert(record);
            }
        });
        Ok(index)
    }

    /// Write a durable snapshot through `store`.
    pub async fn persist(&self, store: &dyn Store) -> Result<()> {
        store.save_snapshot(&self.snapshot()).await
    }

    /// Load the snapshot held by `store`. An empty store yields an empty index.
    pub async fn load(store: &dyn Store, dims: usize) -> Result<Self> {
        match store.load_snapshot().await? {
            Some(snapshot) => Self::from_snapshot(snapshot, dims),
            None => Ok(Self::new(dims)),
        }
    }

    fn check_dims(&self, records: &[EmbeddingRecord]) -> Result<()> {
        match records.iter().find(|r| r.vector.len() != self.dims) {
            Some(bad) => Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: bad.vector.len(),
            }),
            None => Ok(()),
        }
    }

    fn snapshot_state(&self) -> Arc<IndexState> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn write<F: FnOnce(&mut IndexState)>(&self, f: F) {
        let _writer: MutexGuard<'_, ()> = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = (*self.snapshot_state()).clone();
        f(&mut next);
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
    }
}

impl PartialEq for IndexHit {
    fn eq(&self, other: &Self) -> bool {
        self.chunk_id == other.chunk_id
            && self.document_id == other.document_id
            && self.score.total_cmp(&other.score) == Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn rec(chunk: &str, doc: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: chunk.to_string(),
            document_id: doc.to_string(),
            chunk_index: 0,
            pages: vec![1],
            vector,
        }
    }

    fn ids(hits: &[IndexHit]) -> Vec<&str> {
        hits.iter().map(|h| h.chunk_id.as_str()).collect()
    }

    #[test]
    fn query_returns_nearest_first() {
        let index = VectorIndex::new(2);
        index
            .upsert(vec![
                rec("far", "d", vec![0.0, 1.0]),
                rec("near", "d", vec![1.0, 0.1]),
                rec("mid", "d", vec![1.0, 1.0]),
            ])
            .unwrap();
        let hits = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(ids(&hits), vec!["near", "mid"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let index = VectorIndex::new(2);
        index
            .upsert(vec![
                rec("first", "d", vec![1.0, 0.0]),
                rec("second", "d", vec![2.0, 0.0]),
            ])
            .unwrap();
        index.upsert(vec![rec("third", "d", vec![3.0, 0.0])]).unwrap();
        let hits = index.query(&[1.0, 0.0], 3).unwrap();
        assert_eq!(ids(&hits), vec!["first", "second", "third"]);
    }

    #[test]
    fn upsert_replaces_by_chunk_id_and_keeps_position() {
        let index = VectorIndex::new(2);
        index
            .upsert(vec![
                rec("a", "d", vec![1.0, 0.0]),
                rec("b", "d", vec![1.0, 0.0]),
            ])
            .unwrap();
        index.upsert(vec![rec("a", "d", vec![1.0, 0.0])]).unwrap();
        assert_eq!(index.len(), 2);
        let hits = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(ids(&hits), vec!["a", "b"]);
    }

    #[test]
    fn batch_with_wrong_dimension_changes_nothing() {
        let index = VectorIndex::new(3);
        index.upsert(vec![rec("keep", "d", vec![1.0, 0.0, 0.0])]).unwrap();
        let err = index
            .upsert(vec![
                rec("ok", "d", vec![0.0, 1.0, 0.0]),
                rec("bad", "d", vec![0.0, 1.0]),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn query_rejects_wrong_dimension() {
        let index = VectorIndex::new(3);
        let err = index.query(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[test]
    fn delete_by_document_removes_only_that_document() {
        let index = VectorIndex::new(2);
        index
            .upsert(vec![
                rec("a1", "a", vec![1.0, 0.0]),
                rec("a2", "a", vec![0.0, 1.0]),
                rec("b1", "b", vec![1.0, 1.0]),
            ])
            .unwrap();
        assert_eq!(index.delete_by_document("a"), 2);
        assert_eq!(index.delete_by_document("a"), 0);
        assert_eq!(index.len(), 1);
        assert_eq!(ids(&index.query(&[1.0, 0.0], 5).unwrap()), vec!["b1"]);
    }

    #[test]
    fn replace_document_swaps_records() {
        let index = VectorIndex::new(2);
        index.upsert(vec![rec("old", "doc", vec![1.0, 0.0])]).unwrap();
        index
            .replace_document("doc", vec![rec("new", "doc2", vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(ids(&index.query(&[1.0, 0.0], 5).unwrap()), vec!["new"]);
    }

    #[test]
    fn zero_k_and_empty_index_return_nothing() {
        let index = VectorIndex::new(2);
        assert!(index.query(&[1.0, 0.0], 3).unwrap().is_empty());
        index.upsert(vec![rec("a", "d", vec![1.0, 0.0])]).unwrap();
        assert!(index.query(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn readers_see_whole_batches() {
        let index = VectorIndex::new(2);
        std::thread::scope(|s| {
            s.spawn(|| {
                for batch in 0..50 {
                    let records = (0..4)
                        .map(|i| rec(&format!("{}-{}", batch, i), "d", vec![1.0, i as f32]))
                        .collect();
                    index.upsert(records).unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..200 {
                    assert_eq!(index.len() % 4, 0);
                }
            });
        });
        assert_eq!(index.len(), 200);
    }

    #[tokio::test]
    async fn persist_and_load_roundtrip() {
        let store = InMemoryStore::new();
        let index = VectorIndex::new(2);
        index
            .upsert(vec![
                rec("a", "d", vec![1.0, 0.0]),
                rec("b", "d", vec![1.0, 0.0]),
                rec("c", "e", vec![0.0, 1.0]),
            ])
            .unwrap();
        index.persist(&store).await.unwrap();

        let loaded = VectorIndex::load(&store, 2).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(
            loaded.query(&[1.0, 0.0], 3).unwrap(),
            index.query(&[1.0, 0.0], 3).unwrap()
        );
    }

    #[tokio::test]
    async fn load_from_empty_store_is_empty_index() {
        let store = InMemoryStore::new();
        let index = VectorIndex::load(&store, 8).await.unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dims(), 8);
    }

    #[tokio::test]
    async fn load_rejects_dimension_drift() {
        let store = InMemoryStore::new();
        let index = VectorIndex::new(2);
        index.upsert(vec![rec("a", "d", vec![1.0, 0.0])]).unwrap();
        index.persist(&store).await.unwrap();

        let err = VectorIndex::load(&store, 4).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }
}
