//! Index snapshot persistence.
//!
//! The index is stored as a single JSON document. A snapshot that fails
//! to read or deserialize is treated as absent — a rebuild is forced,
//! never an error. Writes go through a temp file plus rename so a crash
//! mid-write cannot leave a torn snapshot behind.

use std::path::Path;

use anyhow::{Context, Result};

use antiblok_core::index::{build_index, KbIndex};

use crate::config::Config;
use crate::scan;

/// Load a structurally valid snapshot, or `None` to force a rebuild.
pub fn load_index(path: &Path) -> Option<KbIndex> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<KbIndex>(&raw) {
        Ok(mut index) => {
            // Older snapshots may lack the count fields.
            index.reconcile();
            Some(index)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "discarding malformed index snapshot");
            None
        }
    }
}

pub fn save_index(path: &Path, index: &KbIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string(index)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)
        .with_context(|| format!("Failed to write index snapshot: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Use the persisted snapshot when valid, otherwise rebuild from the
/// knowledge base and persist the result.
pub fn load_or_rebuild(config: &Config) -> Result<KbIndex> {
    if let Some(index) = load_index(&config.data.index_path) {
        return Ok(index);
    }
    rebuild(config)
}

/// Total rebuild: rescan the KB, build, persist, return.
pub fn rebuild(config: &Config) -> Result<KbIndex> {
    let documents = scan::scan_kb(config)?;
    let index = build_index(documents);
    save_index(&config.data.index_path, &index)?;
    tracing::info!(
        docs = index.document_count,
        terms = index.vocabulary_size(),
        "knowledge base index rebuilt"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use antiblok_core::index::Document;

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("kb_index.json");

        let index = build_index(vec![Document {
            id: "a.md".to_string(),
            text: "блокировка счета".to_string(),
        }]);
        save_index(&path, &index).unwrap();

        let loaded = load_index(&path).expect("snapshot should load");
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_malformed_snapshot_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb_index.json");

        std::fs::write(&path, "{not json").unwrap();
        assert!(load_index(&path).is_none());

        // Structurally invalid: no `documents` field.
        std::fs::write(&path, r#"{"df": {}, "n_docs": 3}"#).unwrap();
        assert!(load_index(&path).is_none());
    }

    #[test]
    fn test_snapshot_without_doc_count_still_retrieves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb_index.json");

        let index = build_index(vec![
            Document {
                id: "115fz.md".to_string(),
                text: "Блокировка счета по 115-ФЗ и подозрительные операции".to_string(),
            },
            Document {
                id: "other.md".to_string(),
                text: "Выписка по карте и тарифы обслуживания".to_string(),
            },
        ]);
        // An older snapshot shape: `documents`, `df`, `doc_len`, but
        // no `n_docs`. It must not load with a zero document count,
        // which would push every IDF negative and return nothing.
        let mut raw = serde_json::to_value(&index).unwrap();
        raw.as_object_mut().unwrap().remove("n_docs");
        std::fs::write(&path, raw.to_string()).unwrap();

        let loaded = load_index(&path).expect("snapshot should load");
        assert_eq!(loaded.document_count, 2);

        let snippets = antiblok_core::retrieve::retrieve("115-ФЗ блокировка", &loaded, 3, 1400);
        assert!(!snippets.is_empty());
        assert!(snippets[0].text.contains("115"));
    }

    #[test]
    fn test_missing_snapshot_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_index(&dir.path().join("missing.json")).is_none());
    }
}
