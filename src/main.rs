//! # docqa CLI
//!
//! The `docqa` binary is a thin shell over [`docqa::Pipeline`]: it loads the
//! configuration, opens the SQLite-backed index, and runs one command.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa ingest <path>` | Index a directory or a single file |
//! | `docqa ask "<question>"` | Answer a question with numbered sources |
//! | `docqa chat` | Interactive question loop |
//! | `docqa remove <path>` | Drop one document from the index |
//! | `docqa reset --yes` | Delete every document and vector |
//! | `docqa stats` | Counts and per-document breakdown |
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `warn`).

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use docqa::config;
use docqa::context::format_pages;
use docqa::ingest::BatchReport;
use docqa::migrate;
use docqa::models::Source;
use docqa::pipeline::{AnswerDetails, Pipeline};
use docqa::progress::ProgressMode;
use docqa::stats::Stats;
use docqa::{db, RagError};

const NO_DOCUMENTS: &str = "No documents indexed yet. Add documents first (docqa ingest <path>).";

/// docqa: ask questions about your documents and get answers with sources.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: question answering over your documents, with sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a directory (filtered by the configured globs) or one file.
    ///
    /// Unchanged files are skipped; changed files replace their previous
    /// version. A file that fails does not stop the rest of the batch.
    Ingest {
        path: PathBuf,

        /// Progress on stderr: `off`, `human`, or `json`. Defaults to
        /// `human` when stderr is a terminal.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// Number of passages to retrieve (defaults to `retrieval.k_default`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Interactive session. Type `help` for commands.
    Chat {
        #[arg(long)]
        k: Option<usize>,
    },

    /// Remove one document and its vectors.
    Remove { path: PathBuf },

    /// Delete every document, chunk, and vector.
    Reset {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Show index statistics.
    Stats,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s)
        .ok_or_else(|| format!("invalid progress mode '{}': use off, human, or json", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&cfg.db.path).await?;
        migrate::run_migrations(&pool).await?;
        pool.close().await;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let pipeline = Pipeline::open(cfg.clone()).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Ingest { path, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let reporter = mode.reporter();
            let report = pipeline.ingest_directory(&path, reporter.as_ref()).await?;
            print_batch_report(&path, &report);
        }
        Commands::Ask { question, k } => {
            let k = k.unwrap_or(cfg.retrieval.k_default);
            match pipeline.ask_detailed(&question, k).await {
                Ok(details) => print_answer(&details),
                Err(RagError::EmptyIndex) => println!("{}", NO_DOCUMENTS),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Chat { k } => {
            let k = k.unwrap_or(cfg.retrieval.k_default);
            chat_loop(&pipeline, k).await?;
        }
        Commands::Remove { path } => {
            let removed = pipeline.remove_document(&path).await?;
            if removed == 0 {
                println!("not indexed: {}", path.display());
            } else {
                println!("removed {} ({} chunks)", path.display(), removed);
            }
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes every indexed document; re-run with --yes to confirm");
            }
            pipeline.reset().await?;
            println!("Index cleared.");
        }
        Commands::Stats => {
            Stats::collect(&pipeline).await?.print();
        }
    }

    Ok(())
}

fn print_batch_report(root: &std::path::Path, report: &BatchReport) {
    println!("ingest {}", root.display());
    println!("  documents: {}", report.documents.len());
    println!(
        "  indexed: {} ({} chunks)",
        report.indexed(),
        report.chunks_indexed()
    );
    println!("  unchanged: {}", report.unchanged());
    println!("  failed: {}", report.failed());
    for (path, stage, reason) in report.failures() {
        println!("    {}  [not {}] {}", path.display(), stage, reason);
    }
    if report.documents.is_empty() {
        println!("  no matching files found");
    }
    println!("ok");
}

fn format_source(n: usize, source: &Source) -> String {
    if source.pages.is_empty() {
        format!("[{}] {}", n, source.document_path)
    } else {
        format!(
            "[{}] {} (p. {})",
            n,
            source.document_path,
            format_pages(&source.pages)
        )
    }
}

fn print_answer(details: &AnswerDetails) {
    println!("{}", details.answer.text);
    if !details.answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in details.answer.sources.iter().enumerate() {
            println!("  {}", format_source(i + 1, source));
        }
    }
}

const CHAT_HELP: &str = "Commands:
  <question>          ask about your documents
  sources             show the passages behind the last answer
  help                show this message
  quit | exit | bye   leave";

async fn chat_loop(pipeline: &Pipeline, k: usize) -> anyhow::Result<()> {
    println!("docqa chat. Type a question, or 'help' for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last: Option<AnswerDetails> = None;

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" | "bye" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                println!("{}", CHAT_HELP);
                continue;
            }
            "sources" => {
                match &last {
                    Some(details) if !details.context.passages.is_empty() => {
                        for passage in &details.context.passages {
                            println!("{}", preview(passage.trim_end(), 300));
                            println!();
                        }
                    }
                    _ => println!("No sources available from the last answer."),
                }
                continue;
            }
            _ => {}
        }

        match pipeline.ask_detailed(input, k).await {
            Ok(details) => {
                print_answer(&details);
                println!(
                    "\n(based on {} passage(s); type 'sources' to view them)",
                    details.context.passages.len()
                );
                last = Some(details);
            }
            Err(RagError::EmptyIndex) => println!("{}", NO_DOCUMENTS),
            Err(e) => println!("error: {}", e),
        }
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}
