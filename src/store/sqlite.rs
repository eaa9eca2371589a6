//! SQLite-backed [`Store`] implementation.
//!
//! Documents and chunks live in ordinary tables; the vector index snapshot
//! lives in `index_meta` plus one `chunk_vectors` row per record, with the
//! embedding stored as a little-endian `f32` BLOB. Multi-statement writes
//! run inside a transaction so a crash never leaves half a document behind.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::index::{IndexSnapshot, SnapshotRecord};
use crate::migrate;
use crate::models::{Chunk, DocumentRecord, EmbeddingRecord, StoredChunk};

use super::{decode_pages, encode_pages, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        path: row.get("path"),
        content_hash: row.get("content_hash"),
        page_count: row.get::<i64, _>("page_count") as u32,
        chunk_count: row.get::<i64, _>("chunk_count") as u32,
        ingested_at: row.get("ingested_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_document_by_path(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT id, path, content_hash, page_count, chunk_count, ingested_at FROM documents WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_document))
    }

    async fn save_document(&self, document: &DocumentRecord, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chunks WHERE document_id IN (SELECT id FROM documents WHERE path = ? OR id = ?)",
        )
        .bind(&document.path)
        .bind(&document.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM documents WHERE path = ? OR id = ?")
            .bind(&document.path)
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, path, content_hash, page_count, chunk_count, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.path)
        .bind(&document.content_hash)
        .bind(document.page_count as i64)
        .bind(document.chunk_count as i64)
        .bind(document.ingested_at)
        .execute(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, start_offset, end_offset, pages)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(encode_pages(&chunk.pages))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT id, path, content_hash, page_count, chunk_count, ingested_at FROM documents ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn get_chunks(&self, chunk_ids: &[String]) -> Result<Vec<StoredChunk>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.text, c.pages, d.path
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.id IN ({})
            "#,
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in chunk_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_id: HashMap<String, StoredChunk> = rows
            .iter()
            .map(|row| {
                let chunk = StoredChunk {
                    chunk_id: row.get("id"),
                    document_id: row.get("document_id"),
                    document_path: row.get("path"),
                    chunk_index: row.get::<i64, _>("chunk_index") as u32,
                    text: row.get("text"),
                    pages: decode_pages(&row.get::<String, _>("pages")),
                };
                (chunk.chunk_id.clone(), chunk)
            })
            .collect();

        Ok(chunk_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn save_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO index_meta (id, dims, metric, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                dims = excluded.dims,
                metric = excluded.metric,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.dims as i64)
        .bind(&snapshot.metric)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for entry in &snapshot.records {
            let record = &entry.record;
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, chunk_index, position, pages, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.chunk_id)
            .bind(&record.document_id)
            .bind(record.chunk_index as i64)
            .bind(entry.position as i64)
            .bind(encode_pages(&record.pages))
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<IndexSnapshot>> {
        let meta = sqlx::query("SELECT dims, metric FROM index_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        let Some(meta) = meta else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, document_id, chunk_index, position, pages, embedding
            FROM chunk_vectors
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(|row| SnapshotRecord {
                record: EmbeddingRecord {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get::<i64, _>("chunk_index") as u32,
                    pages: decode_pages(&row.get::<String, _>("pages")),
                    vector: blob_to_vec(&row.get::<Vec<u8>, _>("embedding")),
                },
                position: row.get::<i64, _>("position") as u64,
            })
            .collect();

        Ok(Some(IndexSnapshot {
            dims: meta.get::<i64, _>("dims") as usize,
            metric: meta.get("metric"),
            records,
        }))
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["chunk_vectors", "index_meta", "chunks", "documents"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
