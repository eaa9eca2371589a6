//! Per-document ingestion.
//!
//! Each file moves through `Discovered → Extracted → Chunked → Embedded →
//! Indexed`. A failure at any step is recorded on that file's
//! [`DocumentReport`] and never touches its siblings. The only error that
//! escapes [`Ingestor::ingest_document`] is a dimension mismatch between the
//! embedder and the index, which no amount of retrying per file can fix.
//!
//! Re-ingesting a path whose content hash is unchanged (and whose records are
//! all present in the index) is a no-op. A changed hash replaces the old
//! version's chunks and vectors in one step.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chunk::Chunker;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::extract::extract_pages;
use crate::index::VectorIndex;
use crate::models::{content_hash, Document, DocumentRecord, EmbeddingRecord};
use crate::store::Store;

/// Ingestion states a document passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    Discovered,
    Extracted,
    Chunked,
    Embedded,
    Indexed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Discovered => "discovered",
            IngestStage::Extracted => "extracted",
            IngestStage::Chunked => "chunked",
            IngestStage::Embedded => "embedded",
            IngestStage::Indexed => "indexed",
        };
        f.write_str(name)
    }
}

/// Final state of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DocumentStatus {
    Indexed { document_id: String, chunks: usize },
    /// Same content hash as the stored version.
    Unchanged { document_id: String },
    /// `stage` is the state the document failed to reach.
    Failed { stage: IngestStage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: DocumentStatus,
}

impl DocumentReport {
    pub(crate) fn failed(path: &Path, stage: IngestStage, reason: impl fmt::Display) -> Self {
        let reason = reason.to_string();
        warn!(path = %path.display(), %stage, %reason, "document failed");
        Self {
            path: path.to_path_buf(),
            status: DocumentStatus::Failed { stage, reason },
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, DocumentStatus::Failed { .. })
    }
}

/// Outcome of ingesting a batch of files, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    pub fn indexed(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Indexed { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Unchanged { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Failed { .. }))
    }

    /// Indexed plus unchanged.
    pub fn successes(&self) -> usize {
        self.documents.len() - self.failed()
    }

    pub fn chunks_indexed(&self) -> usize {
        self.documents
            .iter()
            .map(|d| match d.status {
                DocumentStatus::Indexed { chunks, .. } => chunks,
                _ => 0,
            })
            .sum()
    }

    /// Failed documents as `(path, stage, reason)`.
    pub fn failures(&self) -> Vec<(&Path, IngestStage, &str)> {
        self.documents
            .iter()
            .filter_map(|d| match &d.status {
                DocumentStatus::Failed { stage, reason } => {
                    Some((d.path.as_path(), *stage, reason.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.status)).count()
    }
}

/// Runs one file through the ingestion stages against a shared store and
/// index.
#[derive(Clone)]
pub struct Ingestor {
    pub(crate) chunker: Chunker,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) index: Arc<VectorIndex>,
    pub(crate) batch_size: usize,
}

impl Ingestor {
    pub async fn ingest_document(&self, path: &Path) -> Result<DocumentReport> {
        let path_key = path.display().to_string();

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(DocumentReport::failed(path, IngestStage::Extracted, e)),
        };
        let hash = content_hash(&bytes);

        let existing = match self.store.find_document_by_path(&path_key).await {
            Ok(existing) => existing,
            Err(e) => return Ok(DocumentReport::failed(path, IngestStage::Discovered, e)),
        };
        if let Some(existing) = &existing {
            let complete =
                self.index.document_len(&existing.id) == existing.chunk_count as usize;
            if existing.content_hash == hash && complete {
                return Ok(DocumentReport {
                    path: path.to_path_buf(),
                    status: DocumentStatus::Unchanged {
                        document_id: existing.id.clone(),
                    },
                });
            }
        }

        // PDF parsing is CPU-bound and may panic on hostile input.
        let owned = path.to_path_buf();
        let pages = match tokio::task::spawn_blocking(move || extract_pages(&owned, &bytes)).await
        {
            Ok(Ok(pages)) => pages,
            Ok(Err(RagError::Extraction { reason, .. })) => {
                return Ok(DocumentReport::failed(path, IngestStage::Extracted, reason))
            }
            Ok(Err(e)) => return Ok(DocumentReport::failed(path, IngestStage::Extracted, e)),
            Err(e) => {
                return Ok(DocumentReport::failed(
                    path,
                    IngestStage::Extracted,
                    format!("extractor crashed: {}", e),
                ))
            }
        };

        let document = Document::new(path_key, hash, pages);
        if document.text().trim().is_empty() {
            return Ok(DocumentReport::failed(
                path,
                IngestStage::Chunked,
                "no extractable text",
            ));
        }
        let chunks = self.chunker.chunk(&document);

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            match self.embedder.embed_batch(&texts).await {
                Ok(batch_vectors) => vectors.extend(batch_vectors),
                Err(e @ RagError::DimensionMismatch { .. }) => return Err(e),
                Err(e) => return Ok(DocumentReport::failed(path, IngestStage::Embedded, e)),
            }
        }
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::new(chunk, vector))
            .collect();

        let record = DocumentRecord {
            id: document.id.clone(),
            path: document.path.clone(),
            content_hash: document.content_hash.clone(),
            page_count: document.pages.len() as u32,
            chunk_count: chunks.len() as u32,
            ingested_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.store.save_document(&record, &chunks).await {
            return Ok(DocumentReport::failed(path, IngestStage::Indexed, e));
        }

        let replaced = existing.map(|e| e.id).unwrap_or_else(|| document.id.clone());
        self.index.replace_document(&replaced, records)?;

        info!(
            path = %path.display(),
            document_id = %document.id,
            pages = record.page_count,
            chunks = chunks.len(),
            "indexed document"
        );
        Ok(DocumentReport {
            path: path.to_path_buf(),
            status: DocumentStatus::Indexed {
                document_id: document.id,
                chunks: chunks.len(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::embedding::HashEmbedder;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn make_ingestor(embedder: Arc<dyn Embedder>) -> Ingestor {
        Ingestor {
            chunker: Chunker::new(ChunkingConfig {
                max_size: 40,
                overlap: 10,
                min_size: 5,
            })
            .unwrap(),
            index: Arc::new(VectorIndex::new(embedder.dims())),
            embedder,
            store: Arc::new(InMemoryStore::new()),
            batch_size: 2,
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Embedding("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn indexes_then_reports_unchanged() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("policy.txt");
        fs::write(&file, "Refunds are accepted within 30 days. ".repeat(5)).unwrap();
        let ingestor = make_ingestor(Arc::new(HashEmbedder::new(16)));

        let first = ingestor.ingest_document(&file).await.unwrap();
        let chunks = match first.status {
            DocumentStatus::Indexed { chunks, .. } => chunks,
            other => panic!("unexpected status: {other:?}"),
        };
        assert!(chunks > 1);
        assert_eq!(ingestor.index.len(), chunks);

        let second = ingestor.ingest_document(&file).await.unwrap();
        assert!(matches!(second.status, DocumentStatus::Unchanged { .. }));
        assert_eq!(ingestor.index.len(), chunks);
    }

    #[tokio::test]
    async fn changed_content_replaces_old_version() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, "first version of the notes, long enough to split up").unwrap();
        let ingestor = make_ingestor(Arc::new(HashEmbedder::new(16)));
        ingestor.ingest_document(&file).await.unwrap();

        fs::write(&file, "second").unwrap();
        let report = ingestor.ingest_document(&file).await.unwrap();
        assert!(matches!(
            report.status,
            DocumentStatus::Indexed { chunks: 1, .. }
        ));
        assert_eq!(ingestor.index.len(), 1);
        assert_eq!(ingestor.store.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failures_record_their_stage() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("broken.pdf");
        fs::write(&pdf, b"not a valid pdf").unwrap();
        let blank = dir.path().join("blank.txt");
        fs::write(&blank, "   \n ").unwrap();
        let text = dir.path().join("ok.txt");
        fs::write(&text, "some words").unwrap();

        let ingestor = make_ingestor(Arc::new(HashEmbedder::new(16)));
        let report = ingestor.ingest_document(&pdf).await.unwrap();
        assert!(matches!(
            report.status,
            DocumentStatus::Failed {
                stage: IngestStage::Extracted,
                ..
            }
        ));
        let report = ingestor.ingest_document(&blank).await.unwrap();
        assert!(matches!(
            report.status,
            DocumentStatus::Failed {
                stage: IngestStage::Chunked,
                ..
            }
        ));

        let down = make_ingestor(Arc::new(DownEmbedder));
        let report = down.ingest_document(&text).await.unwrap();
        match report.status {
            DocumentStatus::Failed { stage, reason } => {
                assert_eq!(stage, IngestStage::Embedded);
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(down.index.is_empty());
        assert!(down.store.list_documents().await.unwrap().is_empty());
    }

    #[test]
    fn batch_report_counts() {
        let report = BatchReport {
            documents: vec![
                DocumentReport {
                    path: "a".into(),
                    status: DocumentStatus::Indexed {
                        document_id: "a".into(),
                        chunks: 3,
                    },
                },
                DocumentReport {
                    path: "b".into(),
                    status: DocumentStatus::Unchanged {
                        document_id: "b".into(),
                    },
                },
                DocumentReport {
                    path: "c".into(),
                    status: DocumentStatus::Failed {
                        stage: IngestStage::Extracted,
                        reason: "corrupt".into(),
                    },
                },
            ],
        };
        assert_eq!(report.indexed(), 1);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.successes(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.chunks_indexed(), 3);
        assert_eq!(
            report.failures(),
            vec![(Path::new("c"), IngestStage::Extracted, "corrupt")]
        );
    }
}
