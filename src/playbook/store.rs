//! Locked mutation entry points over the global and workspace stores
//!
//! Every write holds the lock for exactly the store file it rewrites, reloads
//! that file under the lock, mutates it in memory and saves it atomically.
//! When both stores are written, global is handled before workspace.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::context::{build_context, TaskContext};
use crate::curation::{CurationResult, Curator};
use crate::error::{PlaybookError, Result};
use crate::lock::{with_lock, LockRegistry};
use crate::scoring::is_stale;
use crate::types::{
    Bullet, BulletScope, BulletState, BulletType, Delta, FeedbackEvent, FeedbackKind, NewBullet,
    Playbook,
};

use super::blocked::{append_blocked, load_blocked, BlockedEntry};
use super::bullets::{
    add_bullet, deprecate_bullet, find_bullet, find_bullet_mut, has_session_feedback,
};
use super::merge::{load_merged, workspace_blocked_log};
use super::persist::{load, load_playbook, save_playbook};

/// One feedback event aimed at a bullet
#[derive(Debug, Clone)]
pub struct FeedbackItem {
    pub bullet_id: String,
    pub event: FeedbackEvent,
}

impl FeedbackItem {
    pub fn new(bullet_id: impl Into<String>, event: FeedbackEvent) -> Self {
        Self {
            bullet_id: bullet_id.into(),
            event,
        }
    }
}

/// What a feedback batch did. Every submitted id lands in exactly one list.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBatchOutcome {
    pub applied: Vec<String>,
    /// Ids not present in any store
    pub missing: Vec<String>,
    /// Events already recorded for the same session
    pub duplicates: Vec<String>,
    pub curation: CurationResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetOutcome {
    pub bullet_id: String,
    pub scope: BulletScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_pattern_id: Option<String>,
    pub blocked_log: PathBuf,
}

/// Access to the two playbook stores through the lock protocol
pub struct BulletStore {
    config: Config,
    locks: LockRegistry,
}

impl BulletStore {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, LockRegistry::new())
    }

    /// Share a lock registry with a shutdown handler
    pub fn with_registry(config: Config, locks: LockRegistry) -> Self {
        Self { config, locks }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn path_for(&self, scope: BulletScope) -> Result<PathBuf> {
        match scope {
            BulletScope::Global => self.config.global_playbook_path(),
            BulletScope::Workspace => Ok(self.config.workspace_playbook_path()),
        }
    }

    pub fn blocked_log_for(&self, scope: BulletScope) -> Result<PathBuf> {
        match scope {
            BulletScope::Global => self.config.blocked_log_path(),
            BulletScope::Workspace => Ok(workspace_blocked_log(&self.config.workspace_playbook_path())),
        }
    }

    /// Unlocked read of one store
    pub fn load_scope(&self, scope: BulletScope) -> Result<Playbook> {
        Ok(load(&self.path_for(scope)?))
    }

    fn load_workspace_if_present(&self) -> Option<Playbook> {
        let path = self.config.workspace_playbook_path();
        path.exists().then(|| load(&path))
    }

    /// Merged read-only view, blocked content hidden
    pub fn load_merged(&self) -> Result<Playbook> {
        load_merged(&self.config)
    }

    /// Which store holds `bullet_id`; the workspace store is checked first
    pub fn locate(&self, bullet_id: &str) -> Result<Option<BulletScope>> {
        if let Some(workspace) = self.load_workspace_if_present() {
            if find_bullet(&workspace, bullet_id).is_some() {
                return Ok(Some(BulletScope::Workspace));
            }
        }
        let global = self.load_scope(BulletScope::Global)?;
        Ok(find_bullet(&global, bullet_id).map(|_| BulletScope::Global))
    }

    /// Locked read-modify-write of one store. `op` returns a value and
    /// whether the playbook changed; unchanged playbooks are not rewritten.
    pub async fn update<T, F>(&self, scope: BulletScope, op: F) -> Result<T>
    where
        F: FnOnce(&mut Playbook) -> (T, bool),
    {
        let path = self.path_for(scope)?;
        let target = path.clone();
        with_lock(&path, &self.config.lock, &self.locks, || async move {
            let loaded = load_playbook(&target);
            if let Some(recovery) = &loaded.recovery {
                warn!("Store {} recovered before update: {}", target.display(), recovery.error);
            }
            let mut playbook = loaded.playbook;
            let (value, changed) = op(&mut playbook);
            if changed {
                save_playbook(&playbook, &target)?;
            }
            Ok(value)
        })
        .await
    }

    /// Record one explicit feedback event
    pub async fn mark(&self, bullet_id: &str, event: FeedbackEvent) -> Result<FeedbackBatchOutcome> {
        let outcome = self
            .apply_feedback_batch(vec![FeedbackItem::new(bullet_id, event)])
            .await?;
        if !outcome.missing.is_empty() {
            return Err(PlaybookError::BulletNotFound(bullet_id.to_string()));
        }
        Ok(outcome)
    }

    /// Apply feedback events to whichever store holds each bullet
    pub async fn apply_feedback_batch(&self, items: Vec<FeedbackItem>) -> Result<FeedbackBatchOutcome> {
        let mut outcome = FeedbackBatchOutcome::default();
        let workspace = self.load_workspace_if_present();
        let global = self.load_scope(BulletScope::Global)?;

        let mut global_items = Vec::new();
        let mut workspace_items = Vec::new();
        for item in items {
            let in_workspace = workspace
                .as_ref()
                .is_some_and(|w| find_bullet(w, &item.bullet_id).is_some());
            if in_workspace {
                workspace_items.push(item);
            } else if find_bullet(&global, &item.bullet_id).is_some() {
                global_items.push(item);
            } else {
                outcome.missing.push(item.bullet_id);
            }
        }

        for (scope, batch) in [
            (BulletScope::Global, global_items),
            (BulletScope::Workspace, workspace_items),
        ] {
            if batch.is_empty() {
                continue;
            }
            let config = &self.config;
            let part = self
                .update(scope, move |playbook| {
                    let part = record_batch(config, scope, playbook, batch, Utc::now());
                    let changed = !part.applied.is_empty();
                    (part, changed)
                })
                .await?;
            outcome.applied.extend(part.applied);
            outcome.missing.extend(part.missing);
            outcome.duplicates.extend(part.duplicates);
            outcome.curation.absorb(part.curation);
        }

        info!(
            applied = outcome.applied.len(),
            missing = outcome.missing.len(),
            duplicates = outcome.duplicates.len(),
            "Feedback batch applied"
        );
        Ok(outcome)
    }

    /// Route deltas to the store they belong to and curate each under its lock.
    ///
    /// Adds go to the scope they name (global by default); other deltas go to
    /// the store holding their target. With `dry_run` nothing is locked or
    /// written and the result describes what would happen.
    pub async fn curate(&self, deltas: &[Delta], dry_run: bool) -> Result<CurationResult> {
        let workspace = self.load_workspace_if_present();
        let global = self.load_scope(BulletScope::Global)?;

        let mut global_deltas = Vec::new();
        let mut workspace_deltas = Vec::new();
        for delta in deltas {
            let scope = match delta {
                Delta::Add { bullet, .. } => bullet.scope.unwrap_or(BulletScope::Global),
                other => match (other.target_id(), workspace.as_ref()) {
                    (Some(id), Some(w)) if find_bullet(w, id).is_some() => BulletScope::Workspace,
                    _ => BulletScope::Global,
                },
            };
            match scope {
                BulletScope::Global => global_deltas.push(delta.clone()),
                BulletScope::Workspace => workspace_deltas.push(delta.clone()),
            }
        }

        let now = Utc::now();
        let mut total = CurationResult::default();
        for (scope, batch) in [
            (BulletScope::Global, global_deltas),
            (BulletScope::Workspace, workspace_deltas),
        ] {
            if batch.is_empty() {
                continue;
            }
            let context = match scope {
                BulletScope::Global => workspace.clone(),
                BulletScope::Workspace => Some(global.clone()),
            };

            let result = if dry_run {
                let mut target = match scope {
                    BulletScope::Global => global.clone(),
                    BulletScope::Workspace => workspace
                        .clone()
                        .unwrap_or_else(|| Playbook::empty("workspace", now)),
                };
                curator_for(&self.config, scope, context.as_ref(), now).curate(&mut target, &batch)
            } else {
                let config = &self.config;
                self.update(scope, |playbook| {
                    let result = curator_for(config, scope, context.as_ref(), now).curate(playbook, &batch);
                    let changed = result.applied > 0 || result.pruned > 0;
                    (result, changed)
                })
                .await?
            };
            total.absorb(result);
        }
        Ok(total)
    }

    /// Retire a bullet, optionally inverting it, and add it to the blocked log
    pub async fn forget(&self, bullet_id: &str, reason: &str, invert: bool) -> Result<ForgetOutcome> {
        let scope = self
            .locate(bullet_id)?
            .ok_or_else(|| PlaybookError::BulletNotFound(bullet_id.to_string()))?;
        let now = Utc::now();
        let half_life = self.config.scoring.decay_half_life_days;

        let (content, anti_pattern_id) = self
            .update(scope, |playbook| {
                let Some(bullet) = find_bullet(playbook, bullet_id) else {
                    return (Err(PlaybookError::BulletNotFound(bullet_id.to_string())), false);
                };
                let content = bullet.content.clone();
                let anti = (invert && !bullet.is_negative && !bullet.is_anti_pattern()).then(|| NewBullet {
                    content: format!("AVOID: {}. {}", content.trim_end_matches('.'), reason),
                    category: bullet.category.clone(),
                    bullet_type: Some(BulletType::AntiPattern),
                    scope: Some(bullet.scope),
                    tags: vec!["inverted".to_string()],
                    is_negative: true,
                });
                let anti_id = anti.map(|a| add_bullet(playbook, a, scope, None, half_life, now));

                deprecate_bullet(playbook, bullet_id, &format!("forgotten: {}", reason), anti_id.clone(), now);
                if let Some(bullet) = find_bullet_mut(playbook, bullet_id) {
                    bullet.state = BulletState::Retired;
                    bullet.updated_at = now;
                }
                (Ok((content, anti_id)), true)
            })
            .await??;

        let blocked_log = self.blocked_log_for(scope)?;
        append_blocked(
            &blocked_log,
            &BlockedEntry {
                id: bullet_id.to_string(),
                content,
                reason: reason.to_string(),
                forgotten_at: now,
                replaced_by: anti_pattern_id.clone(),
            },
        )?;
        info!(bullet = bullet_id, %scope, "Bullet forgotten");

        Ok(ForgetOutcome {
            bullet_id: bullet_id.to_string(),
            scope,
            anti_pattern_id,
            blocked_log,
        })
    }

    /// Stamp a completed reflection run on the global store
    pub async fn record_reflection(&self, sessions_processed: u64) -> Result<()> {
        let now = Utc::now();
        self.update(BulletScope::Global, |playbook| {
            playbook.metadata.last_reflection = Some(now);
            playbook.metadata.total_reflections += 1;
            playbook.metadata.total_sessions_processed += sessions_processed;
            ((), true)
        })
        .await
    }

    /// Rules and anti-patterns from the merged view ranked for `task`.
    /// `limit` defaults to the configured maximum.
    pub fn context(&self, task: &str, limit: Option<usize>) -> Result<TaskContext> {
        let merged = self.load_merged()?;
        let mut blocked = load_blocked(&self.blocked_log_for(BulletScope::Global)?);
        blocked.extend(load_blocked(&self.blocked_log_for(BulletScope::Workspace)?));
        let limit = limit.unwrap_or(self.config.context.max_bullets);
        Ok(build_context(&merged, &blocked, task, limit, &self.config, Utc::now()))
    }

    /// Active bullets in the merged view without feedback for `days`
    pub fn stale_bullets(&self, days: i64, now: DateTime<Utc>) -> Result<Vec<Bullet>> {
        let merged = self.load_merged()?;
        Ok(merged
            .bullets
            .into_iter()
            .filter(|b| b.is_active() && is_stale(b, days, now))
            .collect())
    }
}

fn curator_for<'a>(
    config: &'a Config,
    scope: BulletScope,
    context: Option<&'a Playbook>,
    now: DateTime<Utc>,
) -> Curator<'a> {
    let curator = Curator::new(config, now).scope(scope);
    match context {
        Some(context) => curator.with_context(context),
        None => curator,
    }
}

/// Sort a batch into missing, duplicate and new events, then record the new ones
fn record_batch(
    config: &Config,
    scope: BulletScope,
    playbook: &mut Playbook,
    items: Vec<FeedbackItem>,
    now: DateTime<Utc>,
) -> FeedbackBatchOutcome {
    let mut part = FeedbackBatchOutcome::default();
    let mut seen: HashSet<(String, FeedbackKind, String)> = HashSet::new();
    let mut events = Vec::new();

    for item in items {
        let Some(bullet) = find_bullet(playbook, &item.bullet_id) else {
            part.missing.push(item.bullet_id);
            continue;
        };
        let duplicate = match item.event.session_path.as_deref() {
            Some(session) => {
                has_session_feedback(bullet, item.event.kind, session)
                    || !seen.insert((item.bullet_id.clone(), item.event.kind, session.to_string()))
            }
            None => false,
        };
        if duplicate {
            part.duplicates.push(item.bullet_id);
        } else {
            part.applied.push(item.bullet_id.clone());
            events.push((item.bullet_id, item.event));
        }
    }

    part.curation = Curator::new(config, now).scope(scope).apply_events(playbook, events);
    part
}
