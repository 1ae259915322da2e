//! Reflection runs: sessions in, curated deltas out
//!
//! Transcripts are exported with a bounded worker pool, the generator is asked
//! for deltas over a few iterations per session, and everything it proposes is
//! validated, deduplicated and weighed against archived evidence before
//! [`BulletStore::curate`] sees it. Nothing is locked until the final curate.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborators::{
    export_sessions, format_history, format_rules_summary, ExportFormat, ReflectionGenerator,
    ReflectionRequest, SearchFilters, SessionArchive,
};
use crate::curation::{deduplicate_deltas, evidence_gate, validate_delta, CurationResult, EvidenceReport};
use crate::error::Result;
use crate::playbook::BulletStore;
use crate::types::Delta;

/// Transcripts shorter than this carry nothing worth reflecting on
const MIN_TRANSCRIPT_CHARS: usize = 50;
const HISTORY_HITS: usize = 3;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionOutcome {
    pub sessions_processed: usize,
    /// Sessions skipped for an empty transcript
    pub sessions_skipped: usize,
    pub deltas_generated: usize,
    /// False when any archive call failed during the run
    pub archive_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curation: Option<CurationResult>,
    /// Deltas that would have been curated, on dry runs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dry_run_deltas: Vec<Delta>,
    /// Additions dropped for strong failure evidence in the archive
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence_rejected: Vec<EvidenceReport>,
    pub errors: Vec<String>,
}

/// Stamp `session` on deltas that should carry their source
fn attribute(delta: Delta, session: &str) -> Delta {
    match delta {
        Delta::Add { bullet, reason, .. } => Delta::Add {
            bullet,
            reason,
            source_session: Some(session.to_string()),
        },
        Delta::Helpful { bullet_id, source_session: None, context } => Delta::Helpful {
            bullet_id,
            source_session: Some(session.to_string()),
            context,
        },
        Delta::Harmful { bullet_id, source_session: None, reason, context } => Delta::Harmful {
            bullet_id,
            source_session: Some(session.to_string()),
            reason,
            context,
        },
        other => other,
    }
}

/// First non-empty transcript line, used as the related-history query
fn history_query(transcript: &str) -> String {
    transcript
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .chars()
        .take(100)
        .collect()
}

/// Drop additions the archive shows failing repeatedly. Other deltas pass.
async fn gate_additions<A>(
    archive: &A,
    deltas: Vec<Delta>,
    store: &BulletStore,
    rejected: &mut Vec<EvidenceReport>,
) -> Vec<Delta>
where
    A: SessionArchive + ?Sized,
{
    let config = &store.config().curation;
    let checked: Vec<(Delta, Option<EvidenceReport>)> = stream::iter(deltas)
        .map(|delta| async move {
            let report = match &delta {
                Delta::Add { bullet, .. } => Some(evidence_gate(&bullet.content, archive, config).await),
                _ => None,
            };
            (delta, report)
        })
        .buffered(config.audit_concurrency.max(1))
        .collect()
        .await;

    let mut kept = Vec::with_capacity(checked.len());
    for (delta, report) in checked {
        match report {
            Some(report) if !report.passed() => {
                info!(reason = %report.reason, "Proposed rule rejected by evidence");
                rejected.push(report);
            }
            _ => kept.push(delta),
        }
    }
    kept
}

/// Reflect on `sessions` and curate what the generator proposes
pub async fn reflect_sessions<A, G>(
    store: &BulletStore,
    archive: &A,
    generator: &G,
    sessions: &[String],
    dry_run: bool,
) -> Result<ReflectionOutcome>
where
    A: SessionArchive + ?Sized,
    G: ReflectionGenerator + ?Sized,
{
    let config = store.config();
    let threshold = config.curation.dedup_similarity_threshold;
    let max_iterations = config.curation.max_reflector_iterations.max(1);
    let max_deltas = config.curation.max_deltas_per_reflection;

    let mut outcome = ReflectionOutcome {
        archive_available: true,
        ..Default::default()
    };

    let snapshot = store.load_merged()?;
    let existing_rules = format_rules_summary(&snapshot);
    let exports = export_sessions(archive, sessions, ExportFormat::Text, config.curation.audit_concurrency).await;

    let mut all_deltas: Vec<Delta> = Vec::new();
    for (session, exported) in exports {
        let transcript = match exported {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not export session {}: {}", session, e);
                outcome.archive_available = false;
                outcome.errors.push(format!("export failed for {}: {}", session, e));
                continue;
            }
        };
        if transcript.trim().chars().count() < MIN_TRANSCRIPT_CHARS {
            debug!("Skipping near-empty session {}", session);
            outcome.sessions_skipped += 1;
            continue;
        }

        let filters = SearchFilters {
            limit: HISTORY_HITS,
            ..Default::default()
        };
        let history = match archive.search(&history_query(&transcript), &filters).await {
            Ok(mut hits) => {
                hits.retain(|h| h.session_path != session);
                hits.truncate(HISTORY_HITS);
                format_history(&hits)
            }
            Err(e) => {
                debug!("History search unavailable: {}", e);
                outcome.archive_available = false;
                format_history(&[])
            }
        };

        let mut session_deltas: Vec<Delta> = Vec::new();
        for iteration in 0..max_iterations {
            let request = ReflectionRequest {
                session_path: session.clone(),
                transcript: transcript.clone(),
                existing_rules: existing_rules.clone(),
                history: history.clone(),
                iteration,
            };
            let proposed = match generator.propose(&request).await {
                Ok(deltas) => deltas,
                Err(e) => {
                    warn!("Reflection failed for {} on iteration {}: {}", session, iteration + 1, e);
                    outcome.errors.push(format!("reflection failed for {}: {}", session, e));
                    break;
                }
            };

            let valid: Vec<Delta> = proposed
                .into_iter()
                .map(|d| attribute(d, &session))
                .filter(|d| match validate_delta(d, &config.curation) {
                    Ok(()) => true,
                    Err(reason) => {
                        debug!("Rejected proposed {} delta: {}", d.kind(), reason);
                        false
                    }
                })
                .collect();
            let fresh = deduplicate_deltas(&valid, &session_deltas, threshold);
            let fresh_count = fresh.len();
            session_deltas.extend(fresh);

            if fresh_count == 0 || session_deltas.len() >= max_deltas {
                break;
            }
        }
        session_deltas.truncate(max_deltas);

        debug!("Session {} produced {} deltas", session, session_deltas.len());
        all_deltas.extend(deduplicate_deltas(&session_deltas, &all_deltas, threshold));
        outcome.sessions_processed += 1;
    }

    outcome.deltas_generated = all_deltas.len();
    let all_deltas = gate_additions(archive, all_deltas, store, &mut outcome.evidence_rejected).await;
    if dry_run {
        outcome.dry_run_deltas = all_deltas;
        return Ok(outcome);
    }

    if !all_deltas.is_empty() {
        outcome.curation = Some(store.curate(&all_deltas, false).await?);
    }
    if outcome.sessions_processed > 0 {
        store.record_reflection(outcome.sessions_processed as u64).await?;
    }

    info!(
        sessions = outcome.sessions_processed,
        deltas = outcome.deltas_generated,
        errors = outcome.errors.len(),
        "Reflection run complete"
    );
    Ok(outcome)
}
