//! Task context: the rules and anti-patterns worth showing for a task
//!
//! Active bullets are ranked by keyword relevance times effective score, so a
//! relevant rule with a poor track record can still lose to a slightly less
//! relevant proven one. Only bullets that match at least one keyword are
//! returned.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::Serialize;
use std::cmp::Ordering;

use crate::config::Config;
use crate::curation::similarity::{extract_keywords, tokenize};
use crate::playbook::BlockedEntry;
use crate::scoring::effective_score;
use crate::types::{Bullet, Playbook};

/// Floor on the score factor so fresh, unscored bullets still rank by relevance
const MIN_SCORE_FACTOR: f64 = 0.1;
/// Relevance a forgotten rule needs before the task is warned about it
const BLOCKED_WARNING_RELEVANCE: f64 = 6.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredBullet {
    #[serde(flatten)]
    pub bullet: Bullet,
    pub relevance: f64,
    pub effective_score: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    pub task: String,
    pub keywords: Vec<String>,
    pub rules: Vec<ScoredBullet>,
    pub anti_patterns: Vec<ScoredBullet>,
    pub warnings: Vec<String>,
}

/// Keyword overlap of a bullet: 3 per whole token, 1 per substring, 5 per tag
pub fn score_relevance(content: &str, tags: &[String], keywords: &[String]) -> f64 {
    if content.is_empty() || keywords.is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();
    let tokens = tokenize(&lower);
    let tags: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();

    let mut score = 0.0;
    let mut seen = Vec::new();
    for keyword in keywords.iter().map(|k| k.to_lowercase()) {
        if seen.contains(&keyword) {
            continue;
        }
        if tokens.contains(&keyword) {
            score += 3.0;
        } else if lower.contains(&keyword) {
            score += 1.0;
        }
        if tags.contains(&keyword) {
            score += 5.0;
        }
        seen.push(keyword);
    }
    score
}

/// A deprecated pattern is a case-insensitive regex; invalid ones match as plain text
fn pattern_matches(pattern: &str, task: &str) -> bool {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(task),
        Err(_) => task.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

fn warnings_for(task: &str, keywords: &[String], playbook: &Playbook, blocked: &[BlockedEntry]) -> Vec<String> {
    let mut warnings = Vec::new();
    for pattern in &playbook.deprecated_patterns {
        if pattern.pattern.trim().is_empty() || !pattern_matches(&pattern.pattern, task) {
            continue;
        }
        let mut warning = format!("Task matches deprecated pattern \"{}\"", pattern.pattern);
        if let Some(replacement) = &pattern.replacement {
            warning.push_str(&format!(" - use {} instead", replacement));
        }
        if !pattern.reason.is_empty() {
            warning.push_str(&format!(" (Reason: {})", pattern.reason));
        }
        warnings.push(warning);
    }
    for entry in blocked {
        if score_relevance(&entry.content, &[], keywords) >= BLOCKED_WARNING_RELEVANCE {
            warnings.push(format!(
                "Task resembles forgotten rule {} \"{}\" (Reason: {})",
                entry.id, entry.content, entry.reason
            ));
        }
    }
    warnings
}

/// Rank the active bullets of `playbook` for `task`, keeping at most `limit`
pub fn build_context(
    playbook: &Playbook,
    blocked: &[BlockedEntry],
    task: &str,
    limit: usize,
    config: &Config,
    now: DateTime<Utc>,
) -> TaskContext {
    let keywords = extract_keywords(task);

    let mut scored: Vec<ScoredBullet> = playbook
        .bullets
        .iter()
        .filter(|b| b.is_active())
        .filter_map(|b| {
            let relevance = score_relevance(&b.content, &b.tags, &keywords);
            let effective = effective_score(b, &config.scoring, now);
            let final_score = relevance * effective.max(MIN_SCORE_FACTOR);
            (final_score > 0.0).then(|| ScoredBullet {
                bullet: b.clone(),
                relevance,
                effective_score: effective,
                final_score,
            })
        })
        .collect();
    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.bullet.id.cmp(&b.bullet.id))
    });
    scored.truncate(limit);

    let (anti_patterns, rules): (Vec<_>, Vec<_>) = scored
        .into_iter()
        .partition(|s| s.bullet.is_negative || s.bullet.is_anti_pattern());

    TaskContext {
        task: task.to_string(),
        warnings: warnings_for(task, &keywords, playbook, blocked),
        keywords,
        rules,
        anti_patterns,
    }
}
