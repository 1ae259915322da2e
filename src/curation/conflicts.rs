//! Advisory contradiction detection between a proposed rule and existing bullets
//!
//! Findings are metadata only. Nothing here blocks an addition or fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::types::Bullet;

use super::similarity::{jaccard, tokenize};

/// Minimum topic overlap before polarity differences count as a conflict
pub const CONFLICT_OVERLAP_THRESHOLD: f64 = 0.5;

static NEGATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(avoid|never|don't|dont|do not|must not|should not|shouldn't)\b")
        .expect("Invalid negation regex")
});
static MUST_NOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bmust not\b").expect("Invalid modal regex"));
static POSITIVE_MODAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(always|must)\b").expect("Invalid modal regex"));
static NEGATIVE_MODAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(never|must not)\b").expect("Invalid modal regex"));
static EXCEPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(except|unless)\b").expect("Invalid exception regex"));

/// Polarity words excluded from the topic overlap
const MARKER_TOKENS: &[&str] = &[
    "avoid", "never", "don", "dont", "do", "not", "must", "should", "shouldn", "always", "except",
    "unless",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub conflicting_bullet_id: String,
    pub reason: String,
}

struct Markers {
    negated: bool,
    positive_modal: bool,
    negative_modal: bool,
    exception: bool,
}

impl Markers {
    fn of(text: &str) -> Self {
        let lower = text.to_lowercase();
        let without_must_not = MUST_NOT_RE.replace_all(&lower, " ");
        Self {
            negated: NEGATION_RE.is_match(&lower),
            positive_modal: POSITIVE_MODAL_RE.is_match(&without_must_not),
            negative_modal: NEGATIVE_MODAL_RE.is_match(&lower),
            exception: EXCEPTION_RE.is_match(&lower),
        }
    }

    fn unconditional(&self) -> bool {
        self.positive_modal && !self.exception
    }
}

fn topic_tokens(text: &str) -> HashSet<String> {
    let mut tokens = tokenize(text);
    tokens.retain(|t| !MARKER_TOKENS.contains(&t.as_str()));
    tokens
}

fn explain(proposed: &Markers, existing: &Markers) -> Option<&'static str> {
    if proposed.negated != existing.negated {
        return Some("one rule negates or avoids what the other recommends");
    }
    let modal_clash = (proposed.positive_modal && existing.negative_modal && !proposed.negative_modal)
        || (existing.positive_modal && proposed.negative_modal && !existing.negative_modal);
    if modal_clash {
        return Some("'always/must' in one rule against 'never/must not' in the other");
    }
    if (proposed.unconditional() && existing.exception)
        || (existing.unconditional() && proposed.exception)
    {
        return Some("unconditional rule against a rule with an exception clause");
    }
    None
}

/// Compare proposed content against every active bullet and report contradictions
pub fn detect_conflicts<'a>(
    proposed: &str,
    existing: impl IntoIterator<Item = &'a Bullet>,
) -> Vec<Conflict> {
    let proposed_tokens = topic_tokens(proposed);
    let proposed_markers = Markers::of(proposed);

    existing
        .into_iter()
        .filter(|b| b.is_active())
        .filter_map(|bullet| {
            let overlap = jaccard(&proposed_tokens, &topic_tokens(&bullet.content));
            if overlap < CONFLICT_OVERLAP_THRESHOLD {
                return None;
            }
            explain(&proposed_markers, &Markers::of(&bullet.content)).map(|why| Conflict {
                conflicting_bullet_id: bullet.id.clone(),
                reason: format!("{} ({:.0}% topic overlap)", why, overlap * 100.0),
            })
        })
        .collect()
}
