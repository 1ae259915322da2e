//! In-memory bullet helpers
//!
//! Pure mutations over a `Playbook`. Persisting the result is a separate step
//! taken under the store lock.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::curation::similarity::normalize_content;
use crate::types::{
    Bullet, BulletScope, BulletState, BulletType, DeprecatedPattern, FeedbackEvent, FeedbackKind,
    Maturity, NewBullet, Playbook,
};

pub fn find_bullet<'a>(playbook: &'a Playbook, id: &str) -> Option<&'a Bullet> {
    playbook.bullets.iter().find(|b| b.id == id)
}

pub fn find_bullet_mut<'a>(playbook: &'a mut Playbook, id: &str) -> Option<&'a mut Bullet> {
    playbook.bullets.iter_mut().find(|b| b.id == id)
}

/// Content-addressed id: `b-` plus 12 hex chars of SHA-256 over
/// normalized content, category and scope. A numeric suffix resolves
/// collisions with ids already in the playbook.
pub fn generate_bullet_id(playbook: &Playbook, content: &str, category: &str, scope: BulletScope) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    hasher.update(b"|");
    hasher.update(category.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(scope.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    let base = format!("b-{}", &digest[..12]);

    if find_bullet(playbook, &base).is_none() {
        return base;
    }
    (2u32..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| find_bullet(playbook, candidate).is_none())
        .unwrap_or(base)
}

/// Append a new candidate bullet and return its id
pub fn add_bullet(
    playbook: &mut Playbook,
    new: NewBullet,
    default_scope: BulletScope,
    source_session: Option<&str>,
    half_life_days: f64,
    now: DateTime<Utc>,
) -> String {
    let scope = new.scope.unwrap_or(default_scope);
    let content = new.content.trim().to_string();
    let category = new.category.trim().to_string();
    let id = generate_bullet_id(playbook, &content, &category, scope);
    let bullet_type = new.bullet_type.unwrap_or(BulletType::Rule);

    let mut tags = Vec::new();
    for tag in new.tags {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    playbook.bullets.push(Bullet {
        id: id.clone(),
        content,
        category,
        bullet_type,
        scope,
        state: BulletState::Active,
        maturity: Maturity::Candidate,
        is_negative: new.is_negative || bullet_type == BulletType::AntiPattern,
        feedback_events: Vec::new(),
        helpful_count: 0,
        harmful_count: 0,
        pinned: false,
        pinned_reason: None,
        deprecated: false,
        deprecated_at: None,
        deprecation_reason: None,
        replaced_by: None,
        decay_half_life_days: half_life_days,
        tags,
        source_sessions: source_session.map(|s| vec![s.to_string()]).unwrap_or_default(),
        source_agents: Vec::new(),
        created_at: now,
        updated_at: now,
    });
    id
}

/// Mark a bullet deprecated and record it in the audit list.
///
/// Returns false when the id is unknown or the bullet is already deprecated.
/// The bullet itself is always retained.
pub fn deprecate_bullet(
    playbook: &mut Playbook,
    id: &str,
    reason: &str,
    replaced_by: Option<String>,
    now: DateTime<Utc>,
) -> bool {
    let Some(bullet) = find_bullet_mut(playbook, id) else {
        return false;
    };
    if bullet.deprecated {
        return false;
    }
    bullet.deprecated = true;
    bullet.deprecated_at = Some(now);
    bullet.deprecation_reason = Some(reason.to_string());
    bullet.replaced_by = replaced_by.clone();
    bullet.state = BulletState::Deprecated;
    bullet.maturity = Maturity::Deprecated;
    bullet.updated_at = now;
    let pattern = bullet.content.clone();

    playbook.deprecated_patterns.push(DeprecatedPattern {
        pattern,
        deprecated_at: now,
        reason: reason.to_string(),
        replacement: replaced_by,
    });
    true
}

/// Append an event to the log and refresh the legacy counters
pub fn record_feedback(bullet: &mut Bullet, event: FeedbackEvent) {
    match event.kind {
        FeedbackKind::Helpful => bullet.helpful_count = bullet.helpful_count.saturating_add(1),
        FeedbackKind::Harmful => bullet.harmful_count = bullet.harmful_count.saturating_add(1),
    }
    if let Some(session) = &event.session_path {
        if !bullet.source_sessions.contains(session) {
            bullet.source_sessions.push(session.clone());
        }
    }
    if event.timestamp > bullet.updated_at {
        bullet.updated_at = event.timestamp;
    }
    bullet.feedback_events.push(event);
}

/// Whether the bullet already holds an event of this kind from this session
pub fn has_session_feedback(bullet: &Bullet, kind: FeedbackKind, session: &str) -> bool {
    bullet
        .feedback_events
        .iter()
        .any(|e| e.kind == kind && e.session_path.as_deref() == Some(session))
}

pub fn active_bullets(playbook: &Playbook) -> Vec<&Bullet> {
    playbook.bullets.iter().filter(|b| b.is_active()).collect()
}

/// Active bullets grouped by category, categories sorted
pub fn bullets_by_category(playbook: &Playbook) -> BTreeMap<String, Vec<&Bullet>> {
    let mut groups: BTreeMap<String, Vec<&Bullet>> = BTreeMap::new();
    for bullet in playbook.bullets.iter().filter(|b| b.is_active()) {
        groups.entry(bullet.category.clone()).or_default().push(bullet);
    }
    groups
}
