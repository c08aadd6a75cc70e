//! BM25 retrieval over the knowledge-base index.
//!
//! Scores every document containing at least one query term, sorts by
//! descending score (stable, so ties retain build order), and returns
//! the top results as cleaned, length-bounded snippets.
//!
//! Snippets deliberately carry no document identity: the assistant must
//! never reveal source filenames to the end user, and that contract is
//! enforced here by the return type.

use std::collections::HashMap;

use crate::index::KbIndex;
use crate::text::{clean_markdown, tokenize, truncate_chars};

/// BM25 term-frequency saturation parameter.
pub const BM25_K1: f64 = 1.2;
/// BM25 length-normalization parameter.
pub const BM25_B: f64 = 0.75;

/// A cleaned excerpt of a scored document. Carries only text — no id,
/// no path, no score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
}

/// Retrieve up to `top_k` snippets relevant to `query`.
///
/// An empty or vocabulary-disjoint query, or an empty index, yields an
/// empty result rather than an error. Documents with non-positive
/// scores are excluded. Snippets that clean to the empty string are
/// dropped.
pub fn retrieve(
    query: &str,
    index: &KbIndex,
    top_k: usize,
    max_snippet_chars: usize,
) -> Vec<Snippet> {
    if index.is_empty() {
        return Vec::new();
    }
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let avgdl = index.avgdl();
    let mut scored: Vec<(f64, &str)> = Vec::new();
    for doc in &index.documents {
        let score = bm25_score(&query_tokens, &doc.text, index, avgdl);
        if score > 0.0 {
            scored.push((score, doc.text.as_str()));
        }
    }

    // Stable sort: equal scores keep document build order.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .filter_map(|(_, text)| {
            let cleaned = truncate_chars(&clean_markdown(text), max_snippet_chars);
            if cleaned.is_empty() {
                None
            } else {
                Some(Snippet { text: cleaned })
            }
        })
        .collect()
}

/// BM25 score of one document against the query token sequence.
///
/// ```text
/// score(q,d) = Σ idf(t) · tf·(k1+1) / (tf + k1·(1 - b + b·|d|/avgdl))
/// idf(t)     = ln(1 + (N - df(t) + 0.5) / (df(t) + 0.5))
/// ```
fn bm25_score(query_tokens: &[String], doc_text: &str, index: &KbIndex, avgdl: f64) -> f64 {
    let doc_tokens = tokenize(doc_text);
    if doc_tokens.is_empty() {
        return 0.0;
    }

    let mut freqs: HashMap<&str, usize> = HashMap::new();
    for token in &doc_tokens {
        *freqs.entry(token.as_str()).or_insert(0) += 1;
    }

    let dl = doc_tokens.len() as f64;
    let n = index.document_count as f64;
    let avgdl = if avgdl > 0.0 { avgdl } else { 1.0 };

    let mut score = 0.0;
    for term in query_tokens {
        let Some(&tf) = freqs.get(term.as_str()) else {
            continue;
        };
        let df = index.term_doc_frequency.get(term).copied().unwrap_or(0) as f64;
        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
        let tf = tf as f64;
        score += idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl));
    }
    score
}
