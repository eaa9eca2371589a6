//! # docqa
//!
//! Question answering over a private document collection, grounded in and
//! attributed to passages from those documents.
//!
//! docqa ingests PDF and plain-text files, splits them into overlapping
//! chunks, embeds the chunks into a vector index persisted in SQLite, and
//! answers questions by retrieving the most relevant passages, packing them
//! into a budgeted context, and asking a language model to answer from that
//! context alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Discover   │──▶│   Ingest     │──▶│ VectorIndex  │◀──┐
//! │ walk+globs  │   │ extract/chunk│   │  + SQLite    │   │
//! └─────────────┘   │    /embed    │   └──────┬───────┘   │ persist/load
//!                   └──────────────┘          │           │
//!                                             ▼           │
//!   question ──▶ Retriever ──▶ ContextAssembler ──▶ AnswerGenerator ──▶ Answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init                        # create database
//! docqa ingest ./docs               # index a directory
//! docqa ask "What is the refund window?"
//! docqa chat                        # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF and plain-text page extraction |
//! | [`discover`] | Directory walking with include/exclude globs |
//! | [`chunk`] | Sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index with snapshots |
//! | [`store`] | Durable document, chunk, and snapshot storage |
//! | [`retrieve`] | Oversampled retrieval with near-duplicate suppression |
//! | [`context`] | Budgeted, citation-marked context assembly |
//! | [`generate`] | Answer generation providers |
//! | [`retry`] | Bounded retry with backoff and timeouts |
//! | [`ingest`] | Per-document ingestion state machine |
//! | [`pipeline`] | End-to-end ingestion and question answering |
//! | [`progress`] | Ingestion progress reporting |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod discover;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod retrieve;
pub mod retry;
pub mod stats;
pub mod store;

pub use error::{RagError, Result};
pub use pipeline::Pipeline;
