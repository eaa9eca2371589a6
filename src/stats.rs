//! Index statistics and health overview.
//!
//! A quick summary of what's indexed: document, chunk, and vector counts,
//! plus a per-document breakdown. Used by `docqa stats` to confirm that
//! ingestion worked and the index agrees with the document store.

use serde::Serialize;

use crate::error::Result;
use crate::models::DocumentRecord;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub db_path: String,
    pub db_bytes: u64,
    pub documents: usize,
    pub pages: u64,
    pub chunks: u64,
    pub vectors: usize,
    pub dims: usize,
    pub per_document: Vec<DocumentRecord>,
}

impl Stats {
    pub async fn collect(pipeline: &Pipeline) -> Result<Self> {
        let documents = pipeline.documents().await?;
        let db_path = &pipeline.config().db.path;
        Ok(Self {
            db_path: db_path.display().to_string(),
            db_bytes: std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0),
            documents: documents.len(),
            pages: documents.iter().map(|d| d.page_count as u64).sum(),
            chunks: documents.iter().map(|d| d.chunk_count as u64).sum(),
            vectors: pipeline.index().len(),
            dims: pipeline.index().dims(),
            per_document: documents,
        })
    }

    /// Whether every stored chunk has a vector in the index.
    pub fn is_consistent(&self) -> bool {
        self.chunks == self.vectors as u64
    }

    pub fn print(&self) {
        println!("docqa Index Stats");
        println!("=================");
        println!();
        println!("  Database:    {}", self.db_path);
        println!("  Size:        {}", format_bytes(self.db_bytes));
        println!();
        println!("  Documents:   {}", self.documents);
        println!("  Pages:       {}", self.pages);
        println!("  Chunks:      {}", self.chunks);
        println!(
            "  Vectors:     {} ({} dims){}",
            self.vectors,
            self.dims,
            if self.is_consistent() {
                ""
            } else {
                "  [out of sync, re-run ingest]"
            }
        );

        if !self.per_document.is_empty() {
            println!();
            println!("  By document:");
            println!(
                "  {:<48} {:>6} {:>8}   {}",
                "PATH", "PAGES", "CHUNKS", "INGESTED"
            );
            println!("  {}", "-".repeat(78));
            for doc in &self.per_document {
                println!(
                    "  {:<48} {:>6} {:>8}   {}",
                    shorten(&doc.path, 48),
                    doc.page_count,
                    doc.chunk_count,
                    format_ts_relative(doc.ingested_at)
                );
            }
        }
        println!();
    }
}

/// Keep the tail of a long path, which is usually the informative part.
fn shorten(path: &str, width: usize) -> String {
    let len = path.chars().count();
    if len <= width {
        return path.to_string();
    }
    let tail: String = path.chars().skip(len - (width - 3)).collect();
    format!("...{}", tail)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_human_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 2 * 3600 - 5), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400 - 5), "1 day ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }

    #[test]
    fn long_paths_keep_their_tail() {
        let short = shorten("/a/b.pdf", 48);
        assert_eq!(short, "/a/b.pdf");
        let long = shorten(&format!("/very/{}/deep/file.pdf", "x".repeat(80)), 20);
        assert_eq!(long.chars().count(), 20);
        assert!(long.ends_with("deep/file.pdf"));
    }
}
