//! External collaborators: the session archive and the reflection generator
//!
//! Both are consumed through traits. Failures surface as
//! [`PlaybookError::CollaboratorUnavailable`] and callers degrade instead of
//! aborting.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::error::{PlaybookError, Result};
use crate::types::{Delta, Maturity, Playbook};

/// One ranked search hit from the session archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHit {
    pub session_path: String,
    #[serde(default)]
    pub agent: Option<String>,
    pub snippet: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub days: Option<u32>,
    pub agent: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Markdown,
    Json,
}

/// Sessions grouped under one day of the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineGroup {
    pub date: String,
    pub sessions: Vec<String>,
}

/// Searchable archive of past agent sessions
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionArchive: Send + Sync {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SessionHit>>;

    async fn export(&self, session_path: &str, format: ExportFormat) -> Result<String>;

    async fn timeline(&self, days: u32) -> Result<Vec<TimelineGroup>>;
}

/// Archive stand-in used when no archive is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableArchive;

#[async_trait::async_trait]
impl SessionArchive for UnavailableArchive {
    async fn search(&self, _query: &str, _filters: &SearchFilters) -> Result<Vec<SessionHit>> {
        Err(PlaybookError::unavailable("session archive", "not configured"))
    }

    async fn export(&self, _session_path: &str, _format: ExportFormat) -> Result<String> {
        Err(PlaybookError::unavailable("session archive", "not configured"))
    }

    async fn timeline(&self, _days: u32) -> Result<Vec<TimelineGroup>> {
        Err(PlaybookError::unavailable("session archive", "not configured"))
    }
}

/// Everything the generator sees for one reflection iteration
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionRequest {
    pub session_path: String,
    pub transcript: String,
    /// Current rules rendered by [`format_rules_summary`]
    pub existing_rules: String,
    /// Related sessions rendered by [`format_history`]
    pub history: String,
    pub iteration: u32,
}

/// Proposes playbook deltas from a session. Output is untrusted.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReflectionGenerator: Send + Sync {
    async fn propose(&self, request: &ReflectionRequest) -> Result<Vec<Delta>>;
}

/// Export many sessions with at most `concurrency` requests in flight.
/// Results come back in input order.
pub async fn export_sessions<A>(
    archive: &A,
    sessions: &[String],
    format: ExportFormat,
    concurrency: usize,
) -> Vec<(String, Result<String>)>
where
    A: SessionArchive + ?Sized,
{
    let mut results: Vec<(usize, String, Result<String>)> = stream::iter(sessions.iter().enumerate())
        .map(|(index, session)| async move {
            let exported = archive.export(session, format).await;
            (index, session.clone(), exported)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(index, _, _)| *index);
    results.into_iter().map(|(_, session, exported)| (session, exported)).collect()
}

/// Active bullets grouped by category, one line each
pub fn format_rules_summary(playbook: &Playbook) -> String {
    let active: Vec<_> = playbook.bullets.iter().filter(|b| b.is_active()).collect();
    if active.is_empty() {
        return "(Playbook is empty)".to_string();
    }

    let mut out = String::new();
    for (category, bullets) in crate::playbook::bullets_by_category(playbook) {
        let _ = writeln!(out, "### {}", category);
        for b in bullets {
            let marker = match b.maturity {
                Maturity::Proven => "proven",
                Maturity::Established => "established",
                _ => "candidate",
            };
            let _ = writeln!(
                out,
                "- [{}] ({}) {} ({}+ / {}-)",
                b.id, marker, b.content, b.helpful_count, b.harmful_count
            );
        }
        out.push('\n');
    }
    out
}

pub fn format_history(hits: &[SessionHit]) -> String {
    if hits.is_empty() {
        return "(No related history found)".to_string();
    }
    hits.iter()
        .map(|h| {
            format!(
                "Session: {}\nAgent: {}\nSnippet: {}\n---",
                h.session_path,
                h.agent.as_deref().unwrap_or("unknown"),
                h.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
