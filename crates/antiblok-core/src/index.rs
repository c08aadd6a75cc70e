//! Lexical knowledge-base index.
//!
//! The index keeps the full document set alongside per-term document
//! frequencies and per-document token counts — everything BM25 scoring
//! needs. It is rebuilt wholesale (no incremental update) and is
//! immutable once built, so it can be shared across concurrent
//! retrieval calls without locking.
//!
//! The serialized snapshot (`documents`, `df`, `doc_len`, `n_docs`)
//! uses ordered maps so a rebuild over an unchanged document set is
//! byte-for-byte identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::text::tokenize;

/// Fallback average document length when the index has no length data.
pub const DEFAULT_AVGDL: f64 = 200.0;

/// A knowledge-base document. Identity is the KB-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
}

/// The built index over a document set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KbIndex {
    /// Source documents, in build order.
    pub documents: Vec<Document>,
    /// Number of documents containing each term at least once.
    #[serde(rename = "df", default)]
    pub term_doc_frequency: BTreeMap<String, u32>,
    /// Token count per document id.
    #[serde(rename = "doc_len", default)]
    pub document_length: BTreeMap<String, usize>,
    /// Number of documents indexed. Zero is the valid "empty knowledge
    /// base" terminal state.
    #[serde(rename = "n_docs", default)]
    pub document_count: usize,
}

impl KbIndex {
    /// Mean document length, or [`DEFAULT_AVGDL`] when no length data
    /// is present.
    pub fn avgdl(&self) -> f64 {
        if self.document_length.is_empty() {
            return DEFAULT_AVGDL;
        }
        let total: usize = self.document_length.values().sum();
        total as f64 / self.document_length.len() as f64
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of distinct terms across the document set.
    pub fn vocabulary_size(&self) -> usize {
        self.term_doc_frequency.len()
    }

    /// Backfill `n_docs` when an older snapshot omits it. A snapshot
    /// is valid with only `documents`, but a zero document count next
    /// to a non-empty document set drives every IDF negative and
    /// retrieval would return nothing.
    pub fn reconcile(&mut self) {
        if self.document_count == 0 && !self.documents.is_empty() {
            self.document_count = self.documents.len();
        }
    }
}

/// Build an index over `documents`.
///
/// Each document is tokenized once; its length is the token count and
/// its distinct terms each bump the document frequency exactly once,
/// regardless of repetition. The build is total and idempotent.
pub fn build_index(documents: Vec<Document>) -> KbIndex {
    let mut term_doc_frequency: BTreeMap<String, u32> = BTreeMap::new();
    let mut document_length: BTreeMap<String, usize> = BTreeMap::new();

    for doc in &documents {
        let tokens = tokenize(&doc.text);
        document_length.insert(doc.id.clone(), tokens.len());

        let mut distinct: Vec<String> = tokens;
        distinct.sort();
        distinct.dedup();
        for term in distinct {
            *term_doc_frequency.entry(term).or_insert(0) += 1;
        }
    }

    KbIndex {
        document_count: documents.len(),
        documents,
        term_doc_frequency,
        document_length,
    }
}
