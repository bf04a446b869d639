//! Corpus discovery: walk the ingest root and select files by glob.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};

/// Always skipped, in addition to configured excludes.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/.*", "**/~$*"];

/// Files under `config.root` matching the include globs and none of the
/// exclude globs, sorted by path. Globs match the path relative to the root.
pub fn scan_corpus(config: &IngestConfig) -> Result<Vec<PathBuf>> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(IngestError::Config(format!(
            "ingest root does not exist or is not a directory: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    tracing::debug!(root = %root.display(), files = files.len(), "corpus scanned");
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IngestError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IngestError::Config(format!("invalid glob set: {}", e)))
}
