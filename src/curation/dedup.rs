//! Order-preserving delta deduplication

use crate::types::{Delta, FeedbackKind};

use super::similarity::{jaccard, normalize_content, tokenize};
use std::collections::HashSet;

/// Comparable shape of a delta
enum DeltaKey {
    Add { normalized: String, tokens: HashSet<String> },
    Feedback { bullet_id: String, kind: FeedbackKind, session: Option<String> },
    Replace { bullet_id: String, content: String },
    Deprecate { bullet_id: String },
    Merge { bullet_ids: Vec<String> },
}

impl DeltaKey {
    fn of(delta: &Delta) -> Self {
        match delta {
            Delta::Add { bullet, .. } => DeltaKey::Add {
                normalized: normalize_content(&bullet.content),
                tokens: tokenize(&bullet.content),
            },
            Delta::Helpful { bullet_id, source_session, .. } => DeltaKey::Feedback {
                bullet_id: bullet_id.clone(),
                kind: FeedbackKind::Helpful,
                session: source_session.clone(),
            },
            Delta::Harmful { bullet_id, source_session, .. } => DeltaKey::Feedback {
                bullet_id: bullet_id.clone(),
                kind: FeedbackKind::Harmful,
                session: source_session.clone(),
            },
            Delta::Replace { bullet_id, new_content, .. } => DeltaKey::Replace {
                bullet_id: bullet_id.clone(),
                content: normalize_content(new_content),
            },
            Delta::Deprecate { bullet_id, .. } => DeltaKey::Deprecate { bullet_id: bullet_id.clone() },
            Delta::Merge { bullet_ids, .. } => {
                let mut ids = bullet_ids.clone();
                ids.sort();
                ids.dedup();
                DeltaKey::Merge { bullet_ids: ids }
            }
        }
    }

    fn duplicates(&self, other: &DeltaKey, threshold: f64) -> bool {
        match (self, other) {
            (
                DeltaKey::Add { normalized: a, tokens: ta },
                DeltaKey::Add { normalized: b, tokens: tb },
            ) => a == b || jaccard(ta, tb) >= threshold,
            (
                DeltaKey::Feedback { bullet_id: a, kind: ka, session: sa },
                DeltaKey::Feedback { bullet_id: b, kind: kb, session: sb },
            ) => a == b && ka == kb && sa == sb,
            (
                DeltaKey::Replace { bullet_id: a, content: ca },
                DeltaKey::Replace { bullet_id: b, content: cb },
            ) => a == b && ca == cb,
            (DeltaKey::Deprecate { bullet_id: a }, DeltaKey::Deprecate { bullet_id: b }) => a == b,
            (DeltaKey::Merge { bullet_ids: a }, DeltaKey::Merge { bullet_ids: b }) => a == b,
            _ => false,
        }
    }
}

/// Drop deltas that duplicate an `existing` delta or an earlier kept one.
///
/// Each candidate is compared only against `existing` and what has already
/// been kept, so running the filter on its own output returns it unchanged.
pub fn deduplicate_deltas(new_deltas: &[Delta], existing: &[Delta], threshold: f64) -> Vec<Delta> {
    let mut seen: Vec<DeltaKey> = existing.iter().map(DeltaKey::of).collect();
    let mut kept = Vec::with_capacity(new_deltas.len());

    for delta in new_deltas {
        let key = DeltaKey::of(delta);
        if seen.iter().any(|s| key.duplicates(s, threshold)) {
            continue;
        }
        seen.push(key);
        kept.push(delta.clone());
    }
    kept
}
