//! Knowledge-base directory scanner.
//!
//! Walks the configured KB root and turns matching files into
//! [`Document`]s whose id is the root-relative path. A missing root is
//! the "no knowledge base configured" case and degrades to an empty
//! document set rather than an error.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use antiblok_core::index::Document;

use crate::config::Config;

pub fn scan_kb(config: &Config) -> Result<Vec<Document>> {
    let root = &config.kb.root;
    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "knowledge base root missing, indexing nothing");
        return Ok(Vec::new());
    }

    let include_set = build_globset(&config.kb.include_globs)?;
    let exclude_set = build_globset(&config.kb.exclude_globs)?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(root) {
        // One unreadable directory must not abort the whole rebuild.
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(%err, "skipping unreadable KB entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        // Unreadable or non-UTF-8 files are skipped, not fatal.
        let Ok(text) = std::fs::read_to_string(path) else {
            tracing::warn!(file = %path.display(), "skipping unreadable KB file");
            continue;
        };
        documents.push(Document { id: rel_str, text });
    }

    // Deterministic build order, and therefore deterministic snapshots.
    documents.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
