//! Text primitives shared by indexing, retrieval, and the dialogue
//! state machine.
//!
//! [`tokenize`] turns raw text into a lowercase term sequence,
//! [`normalize`] produces the canonical form used for classifier input
//! and the repeat-loop guard, and [`clean_markdown`] strips markdown
//! artifacts from knowledge-base excerpts before they reach the user.

/// Minimum token length in characters. Single-character "words" carry
/// no retrieval signal and are dropped.
const MIN_TOKEN_CHARS: usize = 2;

/// Split text into lowercase tokens.
///
/// A token is a maximal run of Unicode letters, digits, or underscores.
/// Tokens shorter than two characters are discarded. Occurrence order
/// is preserved so callers can count term frequencies.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            for lower in ch.to_lowercase() {
                current.push(lower);
            }
        } else if !current.is_empty() {
            push_token(&mut tokens, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_token(&mut tokens, current);
    }
    tokens
}

fn push_token(tokens: &mut Vec<String>, token: String) {
    if token.chars().count() >= MIN_TOKEN_CHARS {
        tokens.push(token);
    }
}

/// Canonical form for classifier input and repeat comparison:
/// lowercased with all whitespace runs collapsed to single spaces.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip markdown artifacts so knowledge-base excerpts read cleanly in
/// a plain-text chat:
///
/// - fenced code blocks are removed entirely
/// - heading markers (`#`…`######`) are stripped
/// - bullet markers (`-`, `*`, `+`) become `• `
/// - emphasis markers (`**`, `__`, `*`, `_`) are removed
/// - runs of blank lines collapse to one
pub fn clean_markdown(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut last_blank = true;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let stripped = strip_line_markers(trimmed)
            .replace("**", "")
            .replace("__", "")
            .replace('*', "")
            .replace('_', "");

        let blank = stripped.trim().is_empty();
        if blank {
            if !last_blank {
                out.push(String::new());
            }
        } else {
            out.push(stripped.trim_end().to_string());
        }
        last_blank = blank;
    }

    out.join("\n").trim().to_string()
}

/// Drop a leading heading marker or rewrite a leading bullet marker.
fn strip_line_markers(line: &str) -> String {
    if line.starts_with('#') {
        let rest = line.trim_start_matches('#');
        return rest.trim_start().to_string();
    }
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return format!("• {}", rest.trim_start());
        }
    }
    line.to_string()
}

/// Hard-truncate to at most `max_chars` characters, respecting UTF-8
/// boundaries, and trim trailing whitespace.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.trim_end().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_single_char_words_dropped() {
        assert!(tokenize("a b c я и").is_empty());
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Блокировка Счета 115-ФЗ"), vec![
            "блокировка", "счета", "115", "фз"
        ]);
    }

    #[test]
    fn test_tokenize_preserves_order_and_repeats() {
        assert_eq!(tokenize("фз фз счет фз"), vec!["фз", "фз", "счет", "фз"]);
    }

    #[test]
    fn test_tokenize_underscore_is_word_char() {
        assert_eq!(tokenize("snake_case x"), vec!["snake_case"]);
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Привет \n\t МИР  "), "привет мир");
    }

    #[test]
    fn test_clean_markdown_removes_fences() {
        let md = "Before\n```rust\nlet x = 1;\n```\nAfter";
        assert_eq!(clean_markdown(md), "Before\nAfter");
    }

    #[test]
    fn test_clean_markdown_headings_and_bullets() {
        let md = "## Заголовок\n- пункт один\n* пункт два";
        assert_eq!(clean_markdown(md), "Заголовок\n• пункт один\n• пункт два");
    }

    #[test]
    fn test_clean_markdown_emphasis_and_blank_runs() {
        let md = "**жирный** и _курсив_\n\n\n\nконец";
        assert_eq!(clean_markdown(md), "жирный и курсив\n\nконец");
    }

    #[test]
    fn test_clean_markdown_fence_only_document_is_empty() {
        assert_eq!(clean_markdown("```\ncode only\n```"), "");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let s = "блокировка";
        assert_eq!(truncate_chars(s, 4), "блок");
        assert_eq!(truncate_chars(s, 100), s);
    }
}
