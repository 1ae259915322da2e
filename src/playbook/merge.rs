//! Read-only merged view of the global and workspace stores

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::types::Playbook;

use super::blocked::{is_blocked, load_blocked};
use super::bullets::deprecate_bullet;
use super::persist::load;

/// Reason recorded on bullets hidden by the blocked log
pub const BLOCKED_REASON: &str = "BLOCKED_CONTENT";

/// Blocked log kept next to the workspace playbook
pub fn workspace_blocked_log(workspace_playbook: &Path) -> PathBuf {
    workspace_playbook.with_file_name("blocked.log")
}

/// Union two playbooks by id. Workspace bullets replace global bullets with the
/// same id in place; new ids are appended in workspace order.
pub fn merge_playbooks(global: Playbook, workspace: Option<Playbook>) -> Playbook {
    let Some(workspace) = workspace else {
        return global;
    };

    let mut merged = global;
    merged.name = "merged-playbook".to_string();
    for bullet in workspace.bullets {
        match merged.bullets.iter_mut().find(|b| b.id == bullet.id) {
            Some(existing) => *existing = bullet,
            None => merged.bullets.push(bullet),
        }
    }
    merged.deprecated_patterns.extend(workspace.deprecated_patterns);
    merged
}

/// Load both stores and merge them without writing to either file.
///
/// Bullets whose content matches the global or workspace blocked log are
/// deprecated in the returned copy only.
pub fn load_merged(config: &Config) -> Result<Playbook> {
    let global = load(&config.global_playbook_path()?);
    let workspace_path = config.workspace_playbook_path();
    let workspace = workspace_path.exists().then(|| load(&workspace_path));
    let mut merged = merge_playbooks(global, workspace);

    let mut blocked = load_blocked(&config.blocked_log_path()?);
    blocked.extend(load_blocked(&workspace_blocked_log(&workspace_path)));
    if blocked.is_empty() {
        return Ok(merged);
    }

    let successors: Vec<&str> = blocked.iter().filter_map(|e| e.replaced_by.as_deref()).collect();
    let now = Utc::now();
    let hidden: Vec<String> = merged
        .bullets
        .iter()
        .filter(|b| !b.deprecated && !successors.contains(&b.id.as_str()))
        .filter(|b| is_blocked(&b.content, &blocked))
        .map(|b| b.id.clone())
        .collect();
    for id in &hidden {
        debug!("Hiding blocked bullet {}", id);
        deprecate_bullet(&mut merged, id, BLOCKED_REASON, None, now);
    }
    Ok(merged)
}
