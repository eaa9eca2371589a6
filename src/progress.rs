//! Ingestion progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts. The
//! pipeline emits [`IngestEvent`]s to whatever [`ProgressReporter`] the caller
//! hands it; the CLI picks one from `--progress`.

use std::io::Write;
use std::path::PathBuf;

/// A single progress event for an ingestion run.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestEvent {
    /// Walking the input; total not known yet.
    Discovering { root: PathBuf },
    /// `n` of `total` documents have finished (in any state).
    Ingesting { n: u64, total: u64, path: PathBuf },
    /// The batch is over.
    Finished {
        indexed: u64,
        unchanged: u64,
        failed: u64,
    },
}

/// Receives progress events. Called from concurrent ingestion tasks.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly lines: `ingest  12 / 1,024 documents  docs/a.pdf`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Discovering { root } => {
                format!("ingest {}  discovering...\n", root.display())
            }
            IngestEvent::Ingesting { n, total, path } => format!(
                "ingest  {} / {} documents  {}\n",
                format_number(*n),
                format_number(*total),
                path.display()
            ),
            IngestEvent::Finished {
                indexed,
                unchanged,
                failed,
            } => format!(
                "ingest  done: {} indexed, {} unchanged, {} failed\n",
                format_number(*indexed),
                format_number(*unchanged),
                format_number(*failed)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root.display().to_string(),
            }),
            IngestEvent::Ingesting { n, total, path } => serde_json::json!({
                "event": "progress",
                "phase": "ingesting",
                "n": n,
                "total": total,
                "path": path.display().to_string(),
            }),
            IngestEvent::Finished {
                indexed,
                unchanged,
                failed,
            } => serde_json::json!({
                "event": "done",
                "indexed": indexed,
                "unchanged": unchanged,
                "failed": failed,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// Discards every event.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse `off`, `human`, or `json`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
