//! Directory discovery for ingestion.
//!
//! Walks a root directory with `walkdir`, keeping regular files whose path
//! relative to the root matches an include glob and no exclude glob. A few
//! well-known build and VCS directories are always excluded. Entries the walk
//! cannot read (dangling symlinks, unreadable directories) are returned
//! separately so one of them never hides the rest of the tree.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{RagError, Result};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Result of walking an ingestion root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Eligible files, sorted by path.
    pub files: Vec<PathBuf>,
    /// Entries the walk could not read, with the reason, sorted by path.
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Files under `root` eligible for ingestion.
///
/// `root` is canonicalized first so the same file always yields the same
/// path no matter how the root was spelled. If `root` is itself a file it is
/// returned as-is, without glob filtering. Only a missing root or a bad glob
/// fails the whole walk.
pub fn discover(root: &Path, config: &IngestConfig) -> Result<Discovery> {
    let root = std::fs::canonicalize(root).map_err(|e| {
        RagError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read {}: {}", root.display(), e),
        ))
    })?;
    if root.is_file() {
        return Ok(Discovery {
            files: vec![root],
            unreadable: Vec::new(),
        });
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut discovery = Discovery::default();
    for entry in WalkDir::new(&root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                let relative = path.strip_prefix(&root).unwrap_or(path.as_path());
                if exclude_set.is_match(relative) {
                    continue;
                }
                warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                discovery.unreadable.push((path, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        if exclude_set.is_match(relative) || !include_set.is_match(relative) {
            continue;
        }
        discovery.files.push(path.to_path_buf());
    }

    discovery.files.sort();
    discovery.unreadable.sort();
    Ok(discovery)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("invalid glob set: {}", e)))
}
