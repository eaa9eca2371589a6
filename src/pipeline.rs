//! Ingestion and question answering over one store and index.
//!
//! [`Pipeline`] owns the components and wires them together:
//!
//! ```text
//! ingest:  discover → [extract → chunk → embed → index] per file → persist
//! ask:     question → retrieve → assemble context → generate (with retry)
//! ```
//!
//! Files in a batch are ingested concurrently, bounded by
//! `ingest.concurrency`. The index snapshot is persisted once per batch, and
//! only when something changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::chunk::Chunker;
use crate::config::Config;
use crate::context::{assemble, AssembledContext};
use crate::discover::discover;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::generate::{create_generator, generate_with_retry, AnswerGenerator, Prompt};
use crate::index::VectorIndex;
use crate::ingest::{BatchReport, DocumentReport, DocumentStatus, IngestStage, Ingestor};
use crate::models::{Answer, DocumentRecord, RetrievalResult};
use crate::progress::{IngestEvent, ProgressReporter};
use crate::retrieve::Retriever;
use crate::retry::RetryPolicy;
use crate::store::{SqliteStore, Store};

/// An answer together with the passages it was generated from.
#[derive(Debug, Clone)]
pub struct AnswerDetails {
    pub answer: Answer,
    pub retrieved: RetrievalResult,
    pub context: AssembledContext,
}

pub struct Pipeline {
    config: Config,
    ingestor: Ingestor,
    retriever: Retriever,
    generator: Arc<dyn AnswerGenerator>,
    generation_policy: RetryPolicy,
    store: Arc<dyn Store>,
    index: Arc<VectorIndex>,
}

impl Pipeline {
    /// Open the SQLite store named in `config` and build every component
    /// from configuration.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.db.path).await?);
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::with_components(config, store, embedder, generator).await
    }

    /// Build a pipeline from explicit components, loading the index snapshot
    /// from `store`.
    pub async fn with_components(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dims() != config.embedding.dims {
            return Err(RagError::DimensionMismatch {
                expected: config.embedding.dims,
                actual: embedder.dims(),
            });
        }

        let chunker = Chunker::new(config.chunking)?;
        let index = Arc::new(VectorIndex::load(store.as_ref(), config.embedding.dims).await?);
        info!(records = index.len(), dims = index.dims(), "loaded vector index");

        let ingestor = Ingestor {
            chunker,
            embedder: Arc::clone(&embedder),
            store: Arc::clone(&store),
            index: Arc::clone(&index),
            batch_size: config.embedding.batch_size,
        };
        let retriever = Retriever::new(
            embedder,
            Arc::clone(&index),
            Arc::clone(&store),
            &config.retrieval,
        );

        Ok(Self {
            generation_policy: config.generation.retry_policy(),
            config,
            ingestor,
            retriever,
            generator,
            store,
            index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ingest every eligible file under `root` (or `root` itself if it is a
    /// file). Per-file failures land in the report; the batch keeps going.
    pub async fn ingest_directory(
        &self,
        root: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        progress.report(IngestEvent::Discovering {
            root: root.to_path_buf(),
        });
        let discovery = discover(root, &self.config.ingest)?;
        let mut report = self.ingest_files(&discovery.files, progress).await?;
        if !discovery.unreadable.is_empty() {
            report
                .documents
                .extend(discovery.unreadable.iter().map(|(path, reason)| {
                    DocumentReport::failed(path, IngestStage::Discovered, reason)
                }));
            report.documents.sort_by(|a, b| a.path.cmp(&b.path));
        }

        progress.report(IngestEvent::Finished {
            indexed: report.indexed() as u64,
            unchanged: report.unchanged() as u64,
            failed: report.failed() as u64,
        });
        info!(
            root = %root.display(),
            indexed = report.indexed(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Ingest a single file regardless of the include globs.
    pub async fn ingest_file(&self, path: &Path) -> Result<DocumentReport> {
        let path = std::fs::canonicalize(path)?;
        let report = self.ingestor.ingest_document(&path).await?;
        if matches!(report.status, DocumentStatus::Indexed { .. }) {
            self.index.persist(self.store.as_ref()).await?;
        }
        Ok(report)
    }

    async fn ingest_files(
        &self,
        files: &[PathBuf],
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        let total = files.len() as u64;
        let mut results = stream::iter(files)
            .map(|path| self.ingestor.ingest_document(path))
            .buffer_unordered(self.config.ingest.concurrency.max(1));

        let mut documents = Vec::with_capacity(files.len());
        while let Some(result) = results.next().await {
            let report = result?;
            progress.report(IngestEvent::Ingesting {
                n: documents.len() as u64 + 1,
                total,
                path: report.path.clone(),
            });
            documents.push(report);
        }
        drop(results);
        documents.sort_by(|a, b| a.path.cmp(&b.path));

        let report = BatchReport { documents };
        if report.indexed() > 0 {
            self.index.persist(self.store.as_ref()).await?;
        }
        Ok(report)
    }

    /// Remove the document stored under `path`. Returns the number of index
    /// records removed (0 if the path was never ingested).
    pub async fn remove_document(&self, path: &Path) -> Result<usize> {
        let key = match std::fs::canonicalize(path) {
            Ok(p) => p.display().to_string(),
            Err(_) => path.display().to_string(),
        };
        let Some(document) = self.store.find_document_by_path(&key).await? else {
            return Ok(0);
        };

        self.store.delete_document(&document.id).await?;
        let removed = self.index.delete_by_document(&document.id);
        self.index.persist(self.store.as_ref()).await?;
        info!(path = %key, removed, "removed document");
        Ok(removed)
    }

    /// Drop every document, chunk, and index record.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await?;
        self.index.clear();
        warn!("cleared all documents and the vector index");
        Ok(())
    }

    /// Every stored document, ordered by path.
    pub async fn documents(&self) -> Result<Vec<DocumentRecord>> {
        self.store.list_documents().await
    }

    /// Answer `question` from the `k` most relevant passages.
    pub async fn ask(&self, question: &str, k: usize) -> Result<Answer> {
        Ok(self.ask_detailed(question, k).await?.answer)
    }

    /// Like [`ask`](Self::ask), also returning the retrieved passages and
    /// the assembled context.
    pub async fn ask_detailed(&self, question: &str, k: usize) -> Result<AnswerDetails> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be at least 1".to_string()));
        }

        let retrieved = self.retriever.retrieve(question, k).await?;
        if retrieved.is_empty() {
            // Index records whose chunks are missing from the store.
            warn!("index returned no passages present in the store");
            return Err(RagError::NoPassages);
        }
        let context = assemble(&retrieved, self.config.context.token_budget)?;
        let prompt = Prompt::new(question, &context);
        let text =
            generate_with_retry(self.generator.as_ref(), &self.generation_policy, &prompt).await?;

        info!(
            passages = context.passages.len(),
            sources = context.sources.len(),
            tokens = context.tokens,
            "answered question"
        );
        Ok(AnswerDetails {
            answer: Answer {
                text,
                sources: context.sources.clone(),
            },
            retrieved,
            context,
        })
    }
}
