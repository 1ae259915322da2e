//! Crash-safe playbook persistence
//!
//! Writes go to a sibling temp file which is renamed over the target, so a
//! reader sees either the previous document or the new one. The previous
//! valid document is kept as `<path>.bak` for recovery.

use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{PlaybookError, Result};
use crate::types::{Playbook, SCHEMA_VERSION};

/// How a damaged store was recovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySource {
    /// The trailing `.bak` document parsed and was used
    Backup,
    /// Nothing usable; an empty playbook was substituted
    Empty,
}

#[derive(Debug, Clone)]
pub struct Recovery {
    pub error: String,
    pub source: RecoverySource,
    /// Where the unreadable file was copied before falling back
    pub corrupt_copy: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub playbook: Playbook,
    pub recovery: Option<Recovery>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

fn playbook_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("playbook")
        .to_string()
}

/// Parse a playbook, `Ok(None)` when the file is missing or blank
pub fn load_strict(path: &Path) -> Result<Option<Playbook>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(None);
    }

    let playbook: Playbook = serde_yaml::from_str(&text).map_err(|e| PlaybookError::StoreParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut ids = std::collections::HashSet::new();
    if let Some(dup) = playbook.bullets.iter().find(|b| !ids.insert(b.id.as_str())) {
        return Err(PlaybookError::StoreParse {
            path: path.to_path_buf(),
            message: format!("duplicate bullet id {}", dup.id),
        });
    }
    if playbook.schema_version > SCHEMA_VERSION {
        warn!(
            "Playbook {} has schema version {}, newer than supported {}",
            path.display(),
            playbook.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(Some(playbook))
}

/// Load a playbook without ever failing the caller.
///
/// Missing or blank files give an empty playbook. A file that cannot be read
/// or parsed is copied aside to `<path>.corrupt.<timestamp>` and left in
/// place; the `.bak` document is used if it parses, else an empty playbook.
pub fn load_playbook(path: &Path) -> LoadOutcome {
    let error = match load_strict(path) {
        Ok(Some(playbook)) => return LoadOutcome { playbook, recovery: None },
        Ok(None) => {
            debug!("No playbook at {}, starting empty", path.display());
            return LoadOutcome {
                playbook: Playbook::empty(&playbook_name(path), Utc::now()),
                recovery: None,
            };
        }
        Err(e) => e,
    };

    warn!("Playbook at {} is unreadable: {}", path.display(), error);
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let corrupt = with_suffix(path, &format!(".corrupt.{}", stamp));
    let corrupt_copy = match std::fs::copy(path, &corrupt) {
        Ok(_) => {
            info!("Copied unreadable playbook to {}", corrupt.display());
            Some(corrupt)
        }
        Err(e) => {
            warn!("Failed to copy unreadable playbook aside: {}", e);
            None
        }
    };

    let backup = backup_path(path);
    match load_strict(&backup) {
        Ok(Some(playbook)) => {
            warn!("Recovered playbook {} from {}", path.display(), backup.display());
            LoadOutcome {
                playbook,
                recovery: Some(Recovery {
                    error: error.to_string(),
                    source: RecoverySource::Backup,
                    corrupt_copy,
                }),
            }
        }
        _ => {
            warn!("No usable backup for {}, continuing with an empty playbook", path.display());
            LoadOutcome {
                playbook: Playbook::empty(&playbook_name(path), Utc::now()),
                recovery: Some(Recovery {
                    error: error.to_string(),
                    source: RecoverySource::Empty,
                    corrupt_copy,
                }),
            }
        }
    }
}

/// Load, discarding recovery details
pub fn load(path: &Path) -> Playbook {
    load_playbook(path).playbook
}

/// Write `contents` to a temp sibling, flush it, then rename over `path`
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let temp = with_suffix(path, &format!(".tmp.{}", &suffix[..8]));

    let written = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&temp, path)
    })();

    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

/// Persist a playbook, keeping the previous valid document as `.bak`
pub fn save_playbook(playbook: &Playbook, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(playbook)?;

    if matches!(load_strict(path), Ok(Some(_))) {
        if let Err(e) = std::fs::copy(path, backup_path(path)) {
            warn!("Failed to refresh backup for {}: {}", path.display(), e);
        }
    }

    atomic_write(path, &yaml)?;
    debug!("Saved {} bullets to {}", playbook.bullets.len(), path.display());
    Ok(())
}
