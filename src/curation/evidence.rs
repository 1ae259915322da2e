//! Evidence gate for proposed rules
//!
//! Searches the session archive for a rule's keywords and counts snippets that
//! read like a success or a failure. Only strong failure evidence rejects; an
//! archive that cannot be reached lets every rule through.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::collaborators::{SearchFilters, SessionArchive};
use crate::config::CurationConfig;

use super::similarity::extract_keywords;

const EVIDENCE_HITS: usize = 20;
/// Shorter rules are not worth a search
const MIN_GATED_CHARS: usize = 15;
const STRONG_SUCCESSES: usize = 5;
const STRONG_FAILURES: usize = 3;

static SUCCESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\bfixed\s+(the|a|an|this|that|it)\b",
        r"|\bsuccessfully\b",
        r"|\bsuccess\b",
        r"|\bsolved\s+(the|a|an|this|that|it)\b",
        r"|\bworking\s+now\b",
        r"|\bworks\s+(now|correctly|properly)\b",
        r"|\bresolved\b",
    ))
    .expect("Invalid success pattern")
});

static FAILURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\bfailed\s+(to|with)\b",
        r"|\berror:",
        r"|\b(threw|throws)\s+.*error\b",
        r"|\bbroken\b",
        r"|\bcrash(ed|es|ing)?\b",
        r"|\bbug\s+(in|found|caused)\b",
        r"|\bdoesn't\s+work\b",
    ))
    .expect("Invalid failure pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceVerdict {
    /// Gate disabled, rule too short or archive unreachable
    Skipped,
    NoEvidence,
    StrongSuccess,
    StrongFailure,
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceReport {
    pub content: String,
    pub verdict: EvidenceVerdict,
    pub reason: String,
    pub session_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

impl EvidenceReport {
    pub fn passed(&self) -> bool {
        self.verdict != EvidenceVerdict::StrongFailure
    }

    fn skipped(content: &str, reason: impl Into<String>) -> Self {
        Self {
            content: content.to_string(),
            verdict: EvidenceVerdict::Skipped,
            reason: reason.into(),
            session_count: 0,
            success_count: 0,
            failure_count: 0,
        }
    }
}

/// Success wins when a snippet matches both
fn classify(snippet: &str) -> (bool, bool) {
    if SUCCESS_RE.is_match(snippet) {
        (true, false)
    } else {
        (false, FAILURE_RE.is_match(snippet))
    }
}

/// Weigh archived sessions for and against `content`
pub async fn evidence_gate<A>(content: &str, archive: &A, config: &CurationConfig) -> EvidenceReport
where
    A: SessionArchive + ?Sized,
{
    if !config.validation_enabled {
        return EvidenceReport::skipped(content, "evidence validation disabled");
    }
    if content.trim().chars().count() < MIN_GATED_CHARS {
        return EvidenceReport::skipped(content, "rule too short to search for");
    }

    let keywords = extract_keywords(content);
    if keywords.is_empty() {
        return EvidenceReport::skipped(content, "no searchable keywords");
    }
    let filters = SearchFilters {
        days: Some(config.validation_lookback_days),
        agent: None,
        limit: EVIDENCE_HITS,
    };
    let hits = match archive.search(&keywords.join(" "), &filters).await {
        Ok(hits) => hits,
        Err(e) => {
            debug!("Evidence search unavailable: {}", e);
            return EvidenceReport::skipped(content, format!("session archive unavailable: {}", e));
        }
    };

    let mut sessions = HashSet::new();
    let (mut successes, mut failures) = (0, 0);
    for hit in hits.iter().filter(|h| !h.session_path.is_empty()) {
        sessions.insert(hit.session_path.as_str());
        match classify(&hit.snippet) {
            (true, _) => successes += 1,
            (_, true) => failures += 1,
            _ => {}
        }
    }

    let (verdict, reason) = if sessions.is_empty() {
        (EvidenceVerdict::NoEvidence, "no historical evidence found".to_string())
    } else if successes >= STRONG_SUCCESSES && failures == 0 {
        (EvidenceVerdict::StrongSuccess, format!("strong success signal ({} successes)", successes))
    } else if failures >= STRONG_FAILURES && successes == 0 {
        (EvidenceVerdict::StrongFailure, format!("strong failure signal ({} failures)", failures))
    } else {
        (EvidenceVerdict::Ambiguous, "evidence found but ambiguous".to_string())
    };

    EvidenceReport {
        content: content.to_string(),
        verdict,
        reason,
        session_count: sessions.len(),
        success_count: successes,
        failure_count: failures,
    }
}
