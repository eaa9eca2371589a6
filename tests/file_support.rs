//! Integration tests for supported file types: plain text and Markdown are
//! indexed with page attribution, PDFs that cannot be parsed and files with
//! no usable text are skipped with the stage they failed at.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use docqa::config::Config;
use docqa::embedding::HashEmbedder;
use docqa::generate::ExtractiveGenerator;
use docqa::ingest::{DocumentStatus, IngestStage};
use docqa::store::{InMemoryStore, Store};
use docqa::Pipeline;

async fn pipeline(dir: &Path) -> Pipeline {
    let mut config = Config::minimal(dir.join("unused.sqlite"));
    config.chunking.max_size = 200;
    config.chunking.overlap = 20;
    config.chunking.min_size = 10;
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(HashEmbedder::new(config.embedding.dims));
    Pipeline::with_components(config, store, embedder, Arc::new(ExtractiveGenerator))
        .await
        .unwrap()
}

fn failed_stage(status: &DocumentStatus) -> Option<IngestStage> {
    match status {
        DocumentStatus::Failed { stage, .. } => Some(*stage),
        _ => None,
    }
}

#[tokio::test]
async fn file_support_markdown_and_text_are_indexed() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("notes.md"),
        "# Notes\n\nThe staging cluster is rebuilt every Sunday night.",
    )
    .unwrap();
    fs::write(
        tmp.path().join("readme.markdown"),
        "Build with make release and copy the artifacts to the bucket.",
    )
    .unwrap();
    fs::write(
        tmp.path().join("todo.txt"),
        "Rotate the database credentials before the audit.",
    )
    .unwrap();
    let pipeline = pipeline(tmp.path()).await;

    for name in ["notes.md", "readme.markdown", "todo.txt"] {
        let report = pipeline.ingest_file(&tmp.path().join(name)).await.unwrap();
        assert!(
            matches!(report.status, DocumentStatus::Indexed { .. }),
            "{} was not indexed: {:?}",
            name,
            report.status
        );
    }
    assert_eq!(pipeline.documents().await.unwrap().len(), 3);
}

#[tokio::test]
async fn file_support_form_feed_pages_are_attributed() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("manual.txt"),
        "Chapter one covers installation on a fresh machine.\x0c\
         Chapter two explains how to calibrate the thermal sensor array.",
    )
    .unwrap();
    let pipeline = pipeline(tmp.path()).await;
    pipeline
        .ingest_file(&tmp.path().join("manual.txt"))
        .await
        .unwrap();

    let documents = pipeline.documents().await.unwrap();
    assert_eq!(documents[0].page_count, 2);

    let answer = pipeline
        .ask("how do I calibrate the thermal sensor array", 1)
        .await
        .unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert!(answer.sources[0].pages.contains(&2));
}

#[tokio::test]
async fn file_support_corrupt_pdf_skipped() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("broken.pdf"), b"%PDF-1.4\n1 0 obj garbage").unwrap();
    fs::write(tmp.path().join("ok.txt"), "This document is fine and readable.").unwrap();
    let pipeline = pipeline(tmp.path()).await;

    let report = pipeline
        .ingest_directory(tmp.path(), &docqa::progress::NoProgress)
        .await
        .unwrap();
    assert_eq!(report.indexed(), 1);
    let broken = report
        .documents
        .iter()
        .find(|d| d.path.ends_with("broken.pdf"))
        .unwrap();
    assert_eq!(failed_stage(&broken.status), Some(IngestStage::Extracted));
}

#[tokio::test]
async fn file_support_invalid_utf8_skipped() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("latin1.txt"), b"caf\xe9 au lait").unwrap();
    let pipeline = pipeline(tmp.path()).await;

    let report = pipeline
        .ingest_file(&tmp.path().join("latin1.txt"))
        .await
        .unwrap();
    assert_eq!(failed_stage(&report.status), Some(IngestStage::Extracted));
    assert!(pipeline.index().is_empty());
}

#[tokio::test]
async fn file_support_whitespace_only_skipped() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("blank.md"), "   \n\n\t  \n").unwrap();
    let pipeline = pipeline(tmp.path()).await;

    let report = pipeline
        .ingest_file(&tmp.path().join("blank.md"))
        .await
        .unwrap();
    assert_eq!(failed_stage(&report.status), Some(IngestStage::Chunked));
    assert!(pipeline.documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_support_unsupported_extension_ignored_by_discovery() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("data.csv"), "a,b,c\n1,2,3\n").unwrap();
    fs::write(tmp.path().join("keep.txt"), "Only this file is eligible.").unwrap();
    let pipeline = pipeline(tmp.path()).await;

    let report = pipeline
        .ingest_directory(tmp.path(), &docqa::progress::NoProgress)
        .await
        .unwrap();
    assert_eq!(report.documents.len(), 1);
    assert!(report.documents[0].path.ends_with("keep.txt"));
}
