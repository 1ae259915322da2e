//! Text normalization, hashing and token-overlap similarity

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+(?:[._\-+]+[\p{L}\p{N}]+)*").expect("Invalid token regex"));

/// Trim, lowercase and collapse runs of whitespace
pub fn normalize_content(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of the normalized text, hex encoded
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercased word tokens of at least two characters, any script
pub fn tokenize(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "can", "to", "of", "in", "for", "on",
    "with", "at", "by", "from", "as", "into", "through", "during", "before", "after", "and",
    "or", "but", "if", "when", "where", "why", "how", "this", "that", "these", "those", "what",
    "which", "who", "there", "here", "i", "you", "he", "she", "it", "we", "they", "me", "him",
    "her", "us", "them",
];

const MAX_KEYWORDS: usize = 10;

/// Up to ten most frequent non-stop-word tokens, ties in order of appearance
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for token in TOKEN_RE.find_iter(&lower).map(|m| m.as_str()) {
        if token.chars().count() < 2 || STOP_WORDS.contains(&token) {
            continue;
        }
        match counts.iter_mut().find(|(t, _)| t == token) {
            Some((_, n)) => *n += 1,
            None => counts.push((token.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(MAX_KEYWORDS).map(|(t, _)| t).collect()
}

/// Jaccard similarity of two token sets. Empty sets share nothing.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Token-level Jaccard similarity of two texts.
///
/// Texts without any tokens are compared by normalized content instead.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let (ta, tb) = (tokenize(a), tokenize(b));
    if ta.is_empty() && tb.is_empty() {
        return if normalize_content(a) == normalize_content(b) { 1.0 } else { 0.0 };
    }
    jaccard(&ta, &tb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("  Run   Tests\tFirst \n"), "run tests first");
    }

    #[test]
    fn test_hash_ignores_case_and_spacing() {
        assert_eq!(content_hash("Use rg for search"), content_hash("  use RG  for search"));
        assert_ne!(content_hash("Use rg for search"), content_hash("Use grep for search"));
        assert_eq!(content_hash("x").len(), 64);
    }

    #[test]
    fn test_tokenize_keeps_compound_tokens() {
        let tokens = tokenize("Call tokio::spawn via cargo-nextest, not a b");
        assert!(tokens.contains("cargo-nextest"));
        assert!(tokens.contains("tokio"));
        assert!(!tokens.contains("a"));
    }

    #[test]
    fn test_extract_keywords_orders_by_frequency() {
        let keywords = extract_keywords("Fix the flaky test: the test races the database, fix it");
        assert_eq!(&keywords[..2], &["fix".to_string(), "test".to_string()]);
        assert!(!keywords.contains(&"the".to_string()));
        assert!(keywords.contains(&"database".to_string()));
        assert!(extract_keywords("the and of").is_empty());
    }

    #[test]
    fn test_tokenize_non_ascii() {
        let tokens = tokenize("Überprüfe die Änderungen vor dem Commit");
        assert!(tokens.contains("überprüfe"));
        assert!(tokens.contains("änderungen"));
        assert_eq!(tokenize("テストを先に書く").len(), 1);
        // Single characters are dropped by count, not byte length
        assert!(tokenize("é ß").is_empty());
    }

    #[test]
    fn test_distinct_non_ascii_texts_differ() {
        assert_eq!(jaccard_similarity("テストを先に書く", "本番に直接デプロイしない"), 0.0);
        assert_eq!(jaccard_similarity("テストを先に書く", " テストを先に書く "), 1.0);
    }

    #[test]
    fn test_tokenless_texts_compare_by_content() {
        assert_eq!(jaccard(&tokenize("!!"), &tokenize("??")), 0.0);
        assert_eq!(jaccard_similarity("!!", "??"), 0.0);
        assert_eq!(jaccard_similarity("->", " -> "), 1.0);
    }

    #[test]
    fn test_jaccard_bounds() {
        assert_eq!(jaccard_similarity("", ""), 1.0);
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
        assert_eq!(jaccard_similarity("Alpha Beta", "beta alpha"), 1.0);
        let partial = jaccard_similarity("alpha beta gamma", "alpha beta delta");
        assert!((partial - 0.5).abs() < 1e-9);
    }
}
