//! Deterministic application of deltas to a playbook
//!
//! One pass over the validated, deduplicated deltas, then a maintenance pass
//! over every bullet the deltas touched: forward promotion, one-step
//! demotion, and inversion or deprecation of rules that turned harmful.
//! Given the same playbook, deltas, config and `now`, the result is identical.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::playbook::bullets::{
    add_bullet, deprecate_bullet, find_bullet, find_bullet_mut, has_session_feedback,
    record_feedback,
};
use crate::scoring::{check_for_demotion, check_for_promotion, decayed_counts, DemotionCheck};
use crate::types::{
    Bullet, BulletScope, BulletType, Delta, FeedbackEvent, FeedbackKind, Maturity, NewBullet,
    Playbook,
};

use super::conflicts::detect_conflicts;
use super::dedup::deduplicate_deltas;
use super::similarity::{content_hash, jaccard, tokenize};
use super::validate::validate_delta;

/// Decayed harmful signal at which a rule is considered harmful-dominant
const HARMFUL_DOMINANT_MIN: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionPhase {
    Add,
    Feedback,
    Replace,
    Deprecate,
    Merge,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Accepted,
    Rejected,
    Skipped,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionLogEntry {
    pub phase: DecisionPhase,
    pub action: DecisionAction,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bullet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inversion {
    pub original_id: String,
    pub original_content: String,
    pub anti_pattern_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub bullet_id: String,
    pub content: String,
    pub conflicting_bullet_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub bullet_id: String,
    pub from: Maturity,
    pub to: Maturity,
}

/// Everything a curation pass did, for reporting and audit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurationResult {
    pub applied: usize,
    pub skipped: usize,
    pub inversions: Vec<Inversion>,
    pub conflicts: Vec<ConflictReport>,
    pub promotions: Vec<Promotion>,
    /// Bullets auto-deprecated during maintenance
    pub pruned: usize,
    pub decision_log: Vec<DecisionLogEntry>,
}

impl CurationResult {
    fn log(
        &mut self,
        phase: DecisionPhase,
        action: DecisionAction,
        reason: impl Into<String>,
        bullet_id: Option<&str>,
        content: Option<&str>,
    ) {
        let reason = reason.into();
        debug!(?phase, ?action, ?bullet_id, "{}", reason);
        self.decision_log.push(DecisionLogEntry {
            phase,
            action,
            reason,
            bullet_id: bullet_id.map(str::to_string),
            content: content.map(str::to_string),
        });
    }

    fn skip(&mut self, phase: DecisionPhase, reason: impl Into<String>, bullet_id: Option<&str>) {
        self.skipped += 1;
        self.log(phase, DecisionAction::Skipped, reason, bullet_id, None);
    }

    /// Fold another pass into this one
    pub fn absorb(&mut self, other: CurationResult) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.pruned += other.pruned;
        self.inversions.extend(other.inversions);
        self.conflicts.extend(other.conflicts);
        self.promotions.extend(other.promotions);
        self.decision_log.extend(other.decision_log);
    }
}

/// Applies deltas to one target playbook
pub struct Curator<'a> {
    config: &'a Config,
    scope: BulletScope,
    context: Option<&'a Playbook>,
    now: DateTime<Utc>,
}

impl<'a> Curator<'a> {
    pub fn new(config: &'a Config, now: DateTime<Utc>) -> Self {
        Self {
            config,
            scope: BulletScope::Global,
            context: None,
            now,
        }
    }

    /// Scope given to new bullets that do not name one
    pub fn scope(mut self, scope: BulletScope) -> Self {
        self.scope = scope;
        self
    }

    /// Additional bullets consulted for duplicate and conflict checks, never mutated
    pub fn with_context(mut self, context: &'a Playbook) -> Self {
        self.context = Some(context);
        self
    }

    /// Validate, deduplicate and apply `deltas` to `target`
    pub fn curate(&self, target: &mut Playbook, deltas: &[Delta]) -> CurationResult {
        let mut result = CurationResult::default();

        let mut valid = Vec::with_capacity(deltas.len());
        for delta in deltas {
            match validate_delta(delta, &self.config.curation) {
                Ok(()) => valid.push(delta.clone()),
                Err(reason) => {
                    result.skipped += 1;
                    result.log(phase_of(delta), DecisionAction::Rejected, reason, delta.target_id(), None);
                }
            }
        }

        let unique = deduplicate_deltas(&valid, &[], self.config.curation.dedup_similarity_threshold);
        let duplicates = valid.len() - unique.len();
        if duplicates > 0 {
            result.skipped += duplicates;
            result.log(
                DecisionPhase::Add,
                DecisionAction::Skipped,
                format!("{} duplicate deltas dropped", duplicates),
                None,
                None,
            );
        }

        let mut touched: Vec<String> = Vec::new();
        for delta in &unique {
            self.apply(target, delta, &mut result, &mut touched);
        }
        self.maintain(target, &touched, &mut result);

        info!(
            applied = result.applied,
            skipped = result.skipped,
            inversions = result.inversions.len(),
            pruned = result.pruned,
            "Curation pass complete"
        );
        result
    }

    /// Record prepared feedback events, then run the same maintenance pass as `curate`
    pub fn apply_events(&self, target: &mut Playbook, events: Vec<(String, FeedbackEvent)>) -> CurationResult {
        let mut result = CurationResult::default();
        let mut touched: Vec<String> = Vec::new();
        for (bullet_id, event) in events {
            self.apply_feedback(target, &bullet_id, event, &mut result, &mut touched);
        }
        self.maintain(target, &touched, &mut result);
        result
    }

    fn apply(&self, target: &mut Playbook, delta: &Delta, result: &mut CurationResult, touched: &mut Vec<String>) {
        match delta {
            Delta::Add { bullet, source_session, .. } => {
                self.apply_add(target, bullet, source_session.as_deref(), result, touched)
            }
            Delta::Helpful { bullet_id, source_session, context } => {
                let event = FeedbackEvent::new(FeedbackKind::Helpful, self.now)
                    .with_session(source_session.clone())
                    .with_context(context.clone());
                self.apply_feedback(target, bullet_id, event, result, touched)
            }
            Delta::Harmful { bullet_id, source_session, reason, context } => {
                let event = FeedbackEvent::new(FeedbackKind::Harmful, self.now)
                    .with_session(source_session.clone())
                    .with_reason(*reason)
                    .with_context(context.clone());
                self.apply_feedback(target, bullet_id, event, result, touched)
            }
            Delta::Replace { bullet_id, new_content, reason } => {
                self.apply_replace(target, bullet_id, new_content, reason.as_deref(), result)
            }
            Delta::Deprecate { bullet_id, reason, replaced_by } => {
                self.apply_deprecate(target, bullet_id, reason, replaced_by.clone(), result)
            }
            Delta::Merge { bullet_ids, merged_content, reason } => {
                self.apply_merge(target, bullet_ids, merged_content, reason.as_deref(), result)
            }
        }
    }

    /// Bullets consulted for duplicate and conflict checks
    fn reference<'b>(&'b self, target: &'b Playbook) -> impl Iterator<Item = &'b Bullet> + 'b {
        let context: Option<&'b Playbook> = self.context;
        target
            .bullets
            .iter()
            .chain(context.into_iter().flat_map(|p| p.bullets.iter()))
    }

    fn apply_add(
        &self,
        target: &mut Playbook,
        new: &NewBullet,
        source_session: Option<&str>,
        result: &mut CurationResult,
        touched: &mut Vec<String>,
    ) {
        let hash = content_hash(&new.content);
        if let Some(existing) = self.reference(target).find(|b| content_hash(&b.content) == hash) {
            let id = existing.id.clone();
            result.skip(DecisionPhase::Add, format!("exact duplicate of {}", id), Some(id.as_str()));
            return;
        }

        let tokens = tokenize(&new.content);
        let threshold = self.config.curation.dedup_similarity_threshold;
        let near = self
            .reference(target)
            .filter(|b| b.is_active())
            .find(|b| jaccard(&tokens, &tokenize(&b.content)) >= threshold)
            .map(|b| b.id.clone());

        if let Some(id) = near {
            match find_bullet_mut(target, &id) {
                Some(bullet) => {
                    let event = FeedbackEvent::new(FeedbackKind::Helpful, self.now)
                        .with_session(source_session.map(str::to_string))
                        .with_context(Some("reinforced by a similar proposed rule".to_string()));
                    record_feedback(bullet, event);
                    result.applied += 1;
                    result.log(
                        DecisionPhase::Add,
                        DecisionAction::Modified,
                        format!("near duplicate reinforced {}", id),
                        Some(id.as_str()),
                        Some(new.content.as_str()),
                    );
                    mark_touched(touched, &id);
                }
                None => result.skip(
                    DecisionPhase::Add,
                    format!("near duplicate of {} in another store", id),
                    Some(id.as_str()),
                ),
            }
            return;
        }

        let conflicts = detect_conflicts(&new.content, self.reference(target));
        let id = add_bullet(
            target,
            new.clone(),
            self.scope,
            source_session,
            self.config.scoring.decay_half_life_days,
            self.now,
        );
        if let Some(bullet) = find_bullet_mut(target, &id) {
            for conflict in &conflicts {
                bullet.add_tag(format!("conflict:{}", conflict.conflicting_bullet_id));
            }
        }
        for conflict in conflicts {
            warn!(bullet = %id, conflicts_with = %conflict.conflicting_bullet_id, "{}", conflict.reason);
            result.conflicts.push(ConflictReport {
                bullet_id: id.clone(),
                content: new.content.clone(),
                conflicting_bullet_id: conflict.conflicting_bullet_id,
                reason: conflict.reason,
            });
        }
        result.applied += 1;
        result.log(
            DecisionPhase::Add,
            DecisionAction::Accepted,
            "new bullet",
            Some(id.as_str()),
            Some(new.content.as_str()),
        );
    }

    fn apply_feedback(
        &self,
        target: &mut Playbook,
        bullet_id: &str,
        event: FeedbackEvent,
        result: &mut CurationResult,
        touched: &mut Vec<String>,
    ) {
        let Some(bullet) = find_bullet_mut(target, bullet_id) else {
            result.skip(DecisionPhase::Feedback, "bullet not found", Some(bullet_id));
            return;
        };
        if let Some(session) = event.session_path.as_deref() {
            if has_session_feedback(bullet, event.kind, session) {
                result.skip(
                    DecisionPhase::Feedback,
                    format!("{} feedback from {} already recorded", event.kind, session),
                    Some(bullet_id),
                );
                return;
            }
        }
        let kind = event.kind;
        record_feedback(bullet, event);
        result.applied += 1;
        result.log(
            DecisionPhase::Feedback,
            DecisionAction::Accepted,
            format!("{} event recorded", kind),
            Some(bullet_id),
            None,
        );
        mark_touched(touched, bullet_id);
    }

    fn apply_replace(
        &self,
        target: &mut Playbook,
        bullet_id: &str,
        new_content: &str,
        reason: Option<&str>,
        result: &mut CurationResult,
    ) {
        let Some(original) = find_bullet(target, bullet_id) else {
            result.skip(DecisionPhase::Replace, "bullet not found", Some(bullet_id));
            return;
        };
        if !original.is_active() {
            result.skip(DecisionPhase::Replace, "bullet is not active", Some(bullet_id));
            return;
        }
        if content_hash(&original.content) == content_hash(new_content) {
            result.skip(DecisionPhase::Replace, "content unchanged", Some(bullet_id));
            return;
        }

        let successor = NewBullet {
            content: new_content.to_string(),
            category: original.category.clone(),
            bullet_type: Some(original.bullet_type),
            scope: Some(original.scope),
            tags: original.tags.clone(),
            is_negative: original.is_negative,
        };
        let new_id = add_bullet(
            target,
            successor,
            self.scope,
            None,
            self.config.scoring.decay_half_life_days,
            self.now,
        );
        let why = format!("replaced: {}", reason.unwrap_or("content revised"));
        deprecate_bullet(target, bullet_id, &why, Some(new_id.clone()), self.now);
        result.applied += 1;
        result.log(
            DecisionPhase::Replace,
            DecisionAction::Accepted,
            format!("replaced by {}", new_id),
            Some(bullet_id),
            Some(new_content),
        );
    }

    fn apply_deprecate(
        &self,
        target: &mut Playbook,
        bullet_id: &str,
        reason: &str,
        replaced_by: Option<String>,
        result: &mut CurationResult,
    ) {
        match find_bullet(target, bullet_id).map(|b| b.pinned) {
            None => result.skip(DecisionPhase::Deprecate, "bullet not found", Some(bullet_id)),
            Some(true) => result.skip(DecisionPhase::Deprecate, "bullet is pinned", Some(bullet_id)),
            Some(false) => {
                if deprecate_bullet(target, bullet_id, reason, replaced_by, self.now) {
                    result.applied += 1;
                    result.log(DecisionPhase::Deprecate, DecisionAction::Accepted, reason, Some(bullet_id), None);
                } else {
                    result.skip(DecisionPhase::Deprecate, "already deprecated", Some(bullet_id));
                }
            }
        }
    }

    fn apply_merge(
        &self,
        target: &mut Playbook,
        bullet_ids: &[String],
        merged_content: &str,
        reason: Option<&str>,
        result: &mut CurationResult,
    ) {
        let mut ids: Vec<&str> = Vec::new();
        for id in bullet_ids {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }

        let mut sources: Vec<&Bullet> = Vec::with_capacity(ids.len());
        for id in &ids {
            match find_bullet(target, id) {
                Some(b) if b.is_active() && !b.pinned => sources.push(b),
                Some(_) => {
                    result.skip(DecisionPhase::Merge, format!("{} is inactive or pinned", id), Some(*id));
                    return;
                }
                None => {
                    result.skip(DecisionPhase::Merge, format!("{} not found", id), Some(*id));
                    return;
                }
            }
        }

        let Some(first) = sources.first().copied() else { return };
        let all_anti = sources.iter().all(|b| b.is_anti_pattern());
        let mut tags: Vec<String> = Vec::new();
        for tag in sources.iter().flat_map(|b| b.tags.iter()) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        let mut sessions: Vec<String> = Vec::new();
        for session in sources.iter().flat_map(|b| b.source_sessions.iter()) {
            if !sessions.contains(session) {
                sessions.push(session.clone());
            }
        }
        let merged = NewBullet {
            content: merged_content.to_string(),
            category: first.category.clone(),
            bullet_type: Some(if all_anti { BulletType::AntiPattern } else { BulletType::Rule }),
            scope: Some(first.scope),
            tags,
            is_negative: all_anti,
        };

        let new_id = add_bullet(target, merged, self.scope, None, self.config.scoring.decay_half_life_days, self.now);
        if let Some(bullet) = find_bullet_mut(target, &new_id) {
            for session in sessions {
                if !bullet.source_sessions.contains(&session) {
                    bullet.source_sessions.push(session);
                }
            }
        }
        let why = format!("merged into {}: {}", new_id, reason.unwrap_or("consolidated"));
        for id in &ids {
            deprecate_bullet(target, id, &why, Some(new_id.clone()), self.now);
        }
        result.applied += 1;
        result.log(
            DecisionPhase::Merge,
            DecisionAction::Accepted,
            format!("{} bullets merged", ids.len()),
            Some(new_id.as_str()),
            Some(merged_content),
        );
    }

    /// Recompute maturity for touched bullets and retire the ones that turned harmful
    fn maintain(&self, target: &mut Playbook, touched: &[String], result: &mut CurationResult) {
        let scoring = &self.config.scoring;
        for id in touched {
            let Some(bullet) = find_bullet_mut(target, id) else { continue };
            if !bullet.is_active() {
                continue;
            }

            let promoted = check_for_promotion(bullet, scoring, self.now);
            if promoted != bullet.maturity {
                info!(bullet = %id, from = %bullet.maturity, to = %promoted, "Bullet promoted");
                result.promotions.push(Promotion { bullet_id: id.clone(), from: bullet.maturity, to: promoted });
                bullet.maturity = promoted;
            }

            let counts = decayed_counts(bullet, scoring, self.now);
            let harmful_dominant = !bullet.pinned
                && counts.harmful >= HARMFUL_DOMINANT_MIN
                && counts.harmful > 2.0 * counts.helpful;

            let decision = check_for_demotion(bullet, scoring, self.now);
            if decision == DemotionCheck::AutoDeprecate || harmful_dominant {
                self.retire_harmful(target, id, result);
                continue;
            }
            if let DemotionCheck::Demote(to) = decision {
                info!(bullet = %id, from = %bullet.maturity, to = %to, "Bullet demoted");
                result.log(
                    DecisionPhase::Maintenance,
                    DecisionAction::Modified,
                    format!("demoted from {} to {}", bullet.maturity, to),
                    Some(id.as_str()),
                    None,
                );
                bullet.maturity = to;
            }
        }
    }

    /// Invert a harmful rule into an anti-pattern, or deprecate it if it is already negative
    fn retire_harmful(&self, target: &mut Playbook, id: &str, result: &mut CurationResult) {
        let Some(bullet) = find_bullet(target, id) else { return };
        result.pruned += 1;

        if bullet.is_negative || bullet.is_anti_pattern() {
            let why = "auto-deprecated: harmful feedback exceeded threshold";
            deprecate_bullet(target, id, why, None, self.now);
            warn!(bullet = %id, "{}", why);
            result.log(DecisionPhase::Maintenance, DecisionAction::Modified, why, Some(id), None);
            return;
        }

        let original_content = bullet.content.clone();
        let content = format!("AVOID: {}. {}", original_content.trim_end_matches('.'), inversion_reason(bullet));
        let hash = content_hash(&content);
        let existing = self
            .reference(target)
            .find(|b| b.is_active() && content_hash(&b.content) == hash)
            .map(|b| b.id.clone());

        let anti_pattern_id = match existing {
            Some(existing) => existing,
            None => {
                let mut tags = bullet.tags.clone();
                tags.retain(|t| !t.starts_with("conflict:"));
                tags.push("inverted".to_string());
                let anti = NewBullet {
                    content,
                    category: bullet.category.clone(),
                    bullet_type: Some(BulletType::AntiPattern),
                    scope: Some(bullet.scope),
                    tags,
                    is_negative: true,
                };
                let sessions = bullet.source_sessions.clone();
                let new_id = add_bullet(target, anti, self.scope, None, self.config.scoring.decay_half_life_days, self.now);
                if let Some(created) = find_bullet_mut(target, &new_id) {
                    created.source_sessions = sessions;
                }
                new_id
            }
        };

        deprecate_bullet(
            target,
            id,
            &format!("inverted into anti-pattern {}", anti_pattern_id),
            Some(anti_pattern_id.clone()),
            self.now,
        );
        warn!(bullet = %id, anti_pattern = %anti_pattern_id, "Harmful rule inverted");
        result.log(
            DecisionPhase::Maintenance,
            DecisionAction::Modified,
            format!("inverted into {}", anti_pattern_id),
            Some(id),
            Some(original_content.as_str()),
        );
        result.inversions.push(Inversion {
            original_id: id.to_string(),
            original_content,
            anti_pattern_id,
        });
    }
}

fn mark_touched(touched: &mut Vec<String>, id: &str) {
    if !touched.iter().any(|t| t == id) {
        touched.push(id.to_string());
    }
}

fn phase_of(delta: &Delta) -> DecisionPhase {
    match delta {
        Delta::Add { .. } => DecisionPhase::Add,
        Delta::Helpful { .. } | Delta::Harmful { .. } => DecisionPhase::Feedback,
        Delta::Replace { .. } => DecisionPhase::Replace,
        Delta::Deprecate { .. } => DecisionPhase::Deprecate,
        Delta::Merge { .. } => DecisionPhase::Merge,
    }
}

/// Explanation appended to an inverted rule
fn inversion_reason(bullet: &Bullet) -> String {
    let harmful: Vec<&FeedbackEvent> = bullet
        .feedback_events
        .iter()
        .filter(|e| e.kind == FeedbackKind::Harmful)
        .collect();
    harmful
        .iter()
        .rev()
        .find_map(|e| e.context.clone().filter(|c| !c.trim().is_empty()))
        .unwrap_or_else(|| format!("Marked harmful {} times", harmful.len()))
}

/// Apply deltas to a standalone playbook with default scope and no context
pub fn curate_playbook(
    playbook: &mut Playbook,
    deltas: &[Delta],
    config: &Config,
    now: DateTime<Utc>,
) -> CurationResult {
    Curator::new(config, now).curate(playbook, deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::bullets::find_bullet;
    use crate::types::HarmfulReason;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-10T08:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn add(content: &str, category: &str) -> Delta {
        Delta::Add {
            bullet: NewBullet::new(content, category),
            reason: None,
            source_session: Some("s0".into()),
        }
    }

    fn harmful(id: &str, session: &str) -> Delta {
        Delta::Harmful {
            bullet_id: id.to_string(),
            source_session: Some(session.to_string()),
            reason: Some(HarmfulReason::CausedBug),
            context: None,
        }
    }

    fn helpful(id: &str, session: &str) -> Delta {
        Delta::Helpful {
            bullet_id: id.to_string(),
            source_session: Some(session.to_string()),
            context: None,
        }
    }

    fn seeded(contents: &[&str]) -> (Playbook, Vec<String>) {
        let now = now();
        let mut playbook = Playbook::empty("test", now);
        let ids = contents
            .iter()
            .map(|c| add_bullet(&mut playbook, NewBullet::new(*c, "general"), BulletScope::Global, None, 90.0, now))
            .collect();
        (playbook, ids)
    }

    #[test]
    fn test_add_creates_candidate() {
        let config = Config::default();
        let mut playbook = Playbook::empty("test", now());
        let result = curate_playbook(&mut playbook, &[add("Run tests before commit", "testing")], &config, now());

        assert_eq!(result.applied, 1);
        let bullet = &playbook.bullets[0];
        assert_eq!(bullet.maturity, Maturity::Candidate);
        assert_eq!(bullet.created_at, now());
        assert_eq!(bullet.source_sessions, vec!["s0".to_string()]);
    }

    #[test]
    fn test_case_variants_collapse_to_one_bullet() {
        let config = Config::default();
        let mut playbook = Playbook::empty("test", now());
        let deltas = vec![add("Run tests before commit", "testing"), add("  RUN tests before   commit", "testing")];
        let result = curate_playbook(&mut playbook, &deltas, &config, now());
        assert_eq!(playbook.bullets.len(), 1);
        assert_eq!(result.applied, 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_exact_duplicate_of_existing_is_skipped() {
        let config = Config::default();
        let (mut playbook, _) = seeded(&["Prefer small commits"]);
        let result = curate_playbook(&mut playbook, &[add("prefer small commits", "git")], &config, now());
        assert_eq!(playbook.bullets.len(), 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_near_duplicate_reinforces_existing() {
        let config = Config::default();
        let (mut playbook, ids) =
            seeded(&["Always run cargo fmt and cargo clippy before pushing changes upstream"]);
        let delta = add("Always run cargo fmt and cargo clippy before pushing changes upstream now", "rust");
        let result = curate_playbook(&mut playbook, &[delta], &config, now());
        assert_eq!(playbook.bullets.len(), 1);
        assert_eq!(result.applied, 1);
        let bullet = find_bullet(&playbook, &ids[0]).unwrap();
        assert_eq!(bullet.feedback_events.len(), 1);
        assert_eq!(bullet.feedback_events[0].kind, FeedbackKind::Helpful);
    }

    #[test]
    fn test_conflicting_add_is_created_and_tagged() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Use mocks for database tests"]);
        let result = curate_playbook(&mut playbook, &[add("Avoid mocks for database tests", "testing")], &config, now());

        assert_eq!(playbook.bullets.len(), 2);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflicting_bullet_id, ids[0]);
        assert!(playbook.bullets[1].tags.contains(&format!("conflict:{}", ids[0])));
    }

    #[test]
    fn test_missing_target_is_skipped_and_counted() {
        let config = Config::default();
        let mut playbook = Playbook::empty("test", now());
        let result = curate_playbook(&mut playbook, &[helpful("b-nope", "s1")], &config, now());
        assert_eq!(result.applied, 0);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_feedback_is_idempotent_per_session() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Prefer small commits"]);
        curate_playbook(&mut playbook, &[helpful(&ids[0], "s1")], &config, now());
        let second = curate_playbook(&mut playbook, &[helpful(&ids[0], "s1")], &config, now());

        assert_eq!(second.skipped, 1);
        assert_eq!(find_bullet(&playbook, &ids[0]).unwrap().feedback_events.len(), 1);
    }

    #[test]
    fn test_three_harmful_inverts_rule() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Mock the database in integration tests."]);
        let deltas = vec![harmful(&ids[0], "s1"), harmful(&ids[0], "s2"), harmful(&ids[0], "s3")];
        let result = curate_playbook(&mut playbook, &deltas, &config, now());

        assert_eq!(result.inversions.len(), 1);
        assert_eq!(result.pruned, 1);
        let inversion = &result.inversions[0];
        let original = find_bullet(&playbook, &ids[0]).unwrap();
        assert!(original.deprecated);
        assert_eq!(original.replaced_by.as_deref(), Some(inversion.anti_pattern_id.as_str()));

        let anti = find_bullet(&playbook, &inversion.anti_pattern_id).unwrap();
        assert_eq!(anti.bullet_type, BulletType::AntiPattern);
        assert_eq!(
            anti.content,
            "AVOID: Mock the database in integration tests. Marked harmful 3 times"
        );
        assert!(anti.tags.contains(&"inverted".to_string()));
        assert!(anti.is_active());
    }

    #[test]
    fn test_single_harmful_keeps_rule() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Mock the database"]);
        let result = curate_playbook(&mut playbook, &[harmful(&ids[0], "s1")], &config, now());
        assert!(result.inversions.is_empty());
        assert!(find_bullet(&playbook, &ids[0]).unwrap().is_active());
    }

    #[test]
    fn test_harmful_anti_pattern_is_deprecated_not_inverted() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Never commit generated files"]);
        playbook.bullets[0].is_negative = true;
        let deltas = vec![harmful(&ids[0], "s1"), harmful(&ids[0], "s2"), harmful(&ids[0], "s3")];
        let result = curate_playbook(&mut playbook, &deltas, &config, now());

        assert!(result.inversions.is_empty());
        assert_eq!(result.pruned, 1);
        assert_eq!(playbook.bullets.len(), 1);
        assert!(playbook.bullets[0].deprecated);
    }

    #[test]
    fn test_pinned_rule_survives_harmful_feedback() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Ask before deleting files"]);
        playbook.bullets[0].pinned = true;
        let deltas: Vec<Delta> = (0..5).map(|i| harmful(&ids[0], &format!("s{}", i))).collect();
        let result = curate_playbook(&mut playbook, &deltas, &config, now());

        assert_eq!(result.pruned, 0);
        assert!(playbook.bullets[0].is_active());
    }

    #[test]
    fn test_promotion_is_reported() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Prefer small commits"]);
        let deltas: Vec<Delta> = (0..3).map(|i| helpful(&ids[0], &format!("s{}", i))).collect();
        let result = curate_playbook(&mut playbook, &deltas, &config, now());

        assert_eq!(result.promotions.len(), 1);
        assert_eq!(result.promotions[0].to, Maturity::Established);
        assert_eq!(playbook.bullets[0].maturity, Maturity::Established);
    }

    #[test]
    fn test_replace_retains_original() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Use npm for installs"]);
        let delta = Delta::Replace {
            bullet_id: ids[0].clone(),
            new_content: "Use pnpm for installs".into(),
            reason: Some("workspace switched".into()),
        };
        let result = curate_playbook(&mut playbook, &[delta], &config, now());

        assert_eq!(result.applied, 1);
        assert_eq!(playbook.bullets.len(), 2);
        let original = find_bullet(&playbook, &ids[0]).unwrap();
        assert!(original.deprecated);
        let successor = find_bullet(&playbook, original.replaced_by.as_deref().unwrap()).unwrap();
        assert_eq!(successor.content, "Use pnpm for installs");
        assert_eq!(successor.category, "general");
    }

    #[test]
    fn test_merge_deprecates_sources() {
        let config = Config::default();
        let (mut playbook, ids) = seeded(&["Run unit tests", "Run integration tests"]);
        let delta = Delta::Merge {
            bullet_ids: ids.clone(),
            merged_content: "Run unit and integration tests before pushing".into(),
            reason: None,
        };
        let result = curate_playbook(&mut playbook, &[delta], &config, now());

        assert_eq!(result.applied, 1);
        assert_eq!(playbook.bullets.len(), 3);
        assert!(playbook.bullets[..2].iter().all(|b| b.deprecated));
        assert!(playbook.bullets[2].is_active());
        assert_eq!(playbook.deprecated_patterns.len(), 2);
    }

    #[test]
    fn test_invalid_delta_is_rejected() {
        let config = Config::default();
        let mut playbook = Playbook::empty("test", now());
        let result = curate_playbook(&mut playbook, &[add("   ", "testing")], &config, now());
        assert_eq!(result.skipped, 1);
        assert_eq!(result.decision_log[0].action, DecisionAction::Rejected);
        assert!(playbook.bullets.is_empty());
    }

    #[test]
    fn test_context_is_consulted_but_not_mutated() {
        let config = Config::default();
        let (context, _) = seeded(&["Prefer small commits"]);
        let snapshot = context.clone();
        let mut target = Playbook::empty("workspace", now());

        let result = Curator::new(&config, now())
            .scope(BulletScope::Workspace)
            .with_context(&context)
            .curate(&mut target, &[add("prefer small commits", "git"), add("Tag releases", "git")]);

        assert_eq!(context, snapshot);
        assert_eq!(result.applied, 1);
        assert_eq!(target.bullets.len(), 1);
        assert_eq!(target.bullets[0].scope, BulletScope::Workspace);
    }

    #[test]
    fn test_curation_is_deterministic() {
        let config = Config::default();
        let (base, ids) = seeded(&["Mock the database", "Prefer small commits"]);
        let deltas = vec![
            add("Write the failing test first", "testing"),
            harmful(&ids[0], "s1"),
            harmful(&ids[0], "s2"),
            harmful(&ids[0], "s3"),
            helpful(&ids[1], "s1"),
        ];

        let mut first = base.clone();
        let mut second = base.clone();
        let r1 = curate_playbook(&mut first, &deltas, &config, now());
        let r2 = curate_playbook(&mut second, &deltas, &config, now());
        assert_eq!(first, second);
        assert_eq!(r1, r2);
    }
}
