//! Directory-marker lock with staleness reclaim and heartbeat
//!
//! Acquisition creates `<store>.lock.d` with `create_dir`, which fails when the
//! marker exists, so at most one process wins. The marker's mtime is the
//! staleness clock: a holder refreshes it on every heartbeat and a waiter
//! moves a marker older than the stale threshold to a tombstone and deletes it. Release happens in `Drop`,
//! so every exit path of the guarded operation removes the marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::LockConfig;
use crate::error::{PlaybookError, Result};

use super::registry::LockRegistry;

const OWNER_FILE: &str = "owner.json";

/// Holder metadata written inside the marker directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOwner {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub target: PathBuf,
}

/// `<target>.lock.d`, next to the store file
pub fn marker_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock.d");
    target.with_file_name(name)
}

/// Age of a marker by mtime; `None` when it cannot be read (already gone)
fn marker_age(marker: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(marker).and_then(|m| m.modified()).ok()?;
    Some(SystemTime::now().duration_since(modified).unwrap_or_default())
}

/// Move a stale marker aside and delete it.
///
/// The rename is atomic, so of several waiters that saw the same stale marker
/// only one moves it. A waiter that lost the race may have moved a freshly
/// created marker instead; the tombstone's age tells, and a live marker is put
/// back. Returns whether a stale marker was removed.
fn reclaim_stale(marker: &Path, stale_threshold: Duration) -> std::io::Result<bool> {
    let mut name = marker.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.stale", uuid::Uuid::new_v4().simple()));
    let tombstone = marker.with_file_name(name);

    match std::fs::rename(marker, &tombstone) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    let still_stale = marker_age(&tombstone).is_some_and(|age| age > stale_threshold);
    if !still_stale {
        if let Err(e) = std::fs::rename(&tombstone, marker) {
            warn!("Could not restore live lock {}: {}", marker.display(), e);
            let _ = std::fs::remove_dir_all(&tombstone);
        }
        return Ok(false);
    }

    std::fs::remove_dir_all(&tombstone)?;
    Ok(true)
}

/// Refresh the marker mtime
pub(crate) fn touch(marker: &Path) -> std::io::Result<()> {
    std::fs::File::open(marker)?.set_modified(SystemTime::now())
}

/// Read the holder metadata of an existing marker
pub fn read_owner(marker: &Path) -> Option<LockOwner> {
    let text = std::fs::read_to_string(marker.join(OWNER_FILE)).ok()?;
    serde_json::from_str(&text).ok()
}

/// Exclusive hold on one store file. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    target: PathBuf,
    marker: PathBuf,
    registry: LockRegistry,
    stop_heartbeat: Option<oneshot::Sender<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl LockGuard {
    /// Acquire the lock for `target`, retrying with a fixed back-off.
    ///
    /// Fails with [`PlaybookError::LockTimeout`] after `max_retries` attempts.
    pub async fn acquire(target: &Path, config: &LockConfig, registry: &LockRegistry) -> Result<Self> {
        let marker = marker_path(target);
        let mut attempts: u32 = 0;

        loop {
            if attempts >= config.max_retries {
                warn!("Lock timeout on {} after {} attempts", target.display(), attempts);
                return Err(PlaybookError::LockTimeout {
                    path: target.to_path_buf(),
                    attempts,
                });
            }
            attempts += 1;

            match std::fs::create_dir(&marker) {
                Ok(()) => {
                    let guard = Self::held(target, marker, config, registry);
                    debug!("Acquired lock on {} (attempt {})", target.display(), attempts);
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(age) = marker_age(&marker) {
                        if age > config.stale_threshold() {
                            let holder = read_owner(&marker).map(|o| o.pid);
                            warn!(
                                "Reclaiming stale lock {} (age {:?}, holder pid {:?})",
                                marker.display(),
                                age,
                                holder
                            );
                            match reclaim_stale(&marker, config.stale_threshold()) {
                                Ok(true) => {}
                                Ok(false) => debug!("Stale lock {} was already replaced", marker.display()),
                                Err(e) => warn!("Failed to reclaim stale lock: {}", e),
                            }
                            continue;
                        }
                    } else {
                        // Released between create_dir and metadata
                        continue;
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if let Some(parent) = marker.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(config.retry_delay()).await;
        }
    }

    fn held(target: &Path, marker: PathBuf, config: &LockConfig, registry: &LockRegistry) -> Self {
        let owner = LockOwner {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            target: target.to_path_buf(),
        };
        match serde_json::to_string_pretty(&owner) {
            Ok(json) => {
                if let Err(e) = std::fs::write(marker.join(OWNER_FILE), json) {
                    debug!("Could not write lock owner file: {}", e);
                }
            }
            Err(e) => debug!("Could not serialize lock owner: {}", e),
        }
        registry.register(&marker);

        let (stop_tx, stop_rx) = oneshot::channel();
        let heartbeat = tokio::spawn(run_heartbeat(marker.clone(), config.heartbeat_interval(), stop_rx));

        Self {
            target: target.to_path_buf(),
            marker,
            registry: registry.clone(),
            stop_heartbeat: Some(stop_tx),
            heartbeat: Some(heartbeat),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Release explicitly; equivalent to dropping the guard
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_heartbeat.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        match std::fs::remove_dir_all(&self.marker) {
            Ok(()) => debug!("Released lock on {}", self.target.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove lock marker {}: {}", self.marker.display(), e),
        }
        self.registry.unregister(&self.marker);
    }
}

async fn run_heartbeat(marker: PathBuf, interval: Duration, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match touch(&marker) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => break,
                    Err(e) => {
                        warn!("Lock heartbeat failed for {}: {}", marker.display(), e);
                        break;
                    }
                }
                debug!("Lock heartbeat {}", marker.display());
            }
            _ = &mut stop => break,
        }
    }
    debug!("Lock heartbeat stopped for {}", marker.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> LockConfig {
        LockConfig {
            stale_threshold_ms: 30_000,
            retry_delay_ms: 10,
            max_retries: 5,
            heartbeat_interval_ms: 10_000,
        }
    }

    #[test]
    fn test_marker_path_is_sibling() {
        let marker = marker_path(Path::new("/data/playbook.yaml"));
        assert_eq!(marker, PathBuf::from("/data/playbook.yaml.lock.d"));
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("playbook.yaml");
        let registry = LockRegistry::new();

        let guard = LockGuard::acquire(&target, &fast_config(), &registry).await.unwrap();
        let marker = guard.marker().to_path_buf();
        assert!(marker.is_dir());
        assert!(registry.is_held(&marker));
        assert_eq!(read_owner(&marker).unwrap().pid, std::process::id());

        guard.release();
        assert!(!marker.exists());
        assert!(!registry.is_held(&marker));
    }

    #[tokio::test]
    async fn test_live_marker_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("playbook.yaml");
        std::fs::create_dir(marker_path(&target)).unwrap();

        let err = LockGuard::acquire(&target, &fast_config(), &LockRegistry::new())
            .await
            .unwrap_err();
        match err {
            PlaybookError::LockTimeout { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {other}"),
        }
        assert!(marker_path(&target).exists());
    }

    #[tokio::test]
    async fn test_stale_marker_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("playbook.yaml");
        let marker = marker_path(&target);
        std::fs::create_dir(&marker).unwrap();
        std::fs::File::open(&marker)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        let guard = LockGuard::acquire(&target, &fast_config(), &LockRegistry::new()).await;
        assert!(guard.is_ok());
    }

    fn leftover_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_reclaim_removes_stale_marker_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_path(&dir.path().join("playbook.yaml"));
        std::fs::create_dir(&marker).unwrap();
        std::fs::write(marker.join(OWNER_FILE), "{}").unwrap();
        std::fs::File::open(&marker)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        assert!(reclaim_stale(&marker, Duration::from_secs(30)).unwrap());
        assert!(leftover_entries(dir.path()).is_empty());
        assert!(!reclaim_stale(&marker, Duration::from_secs(30)).unwrap());
    }

    #[test]
    fn test_reclaim_puts_back_a_live_marker() {
        // A waiter that judged the previous marker stale finds a fresh one in its place
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_path(&dir.path().join("playbook.yaml"));
        std::fs::create_dir(&marker).unwrap();
        std::fs::write(marker.join(OWNER_FILE), "{}").unwrap();

        assert!(!reclaim_stale(&marker, Duration::from_secs(30)).unwrap());
        assert!(marker.join(OWNER_FILE).exists());
        assert_eq!(leftover_entries(dir.path()), vec!["playbook.yaml.lock.d".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("deeper").join("playbook.yaml");
        let guard = LockGuard::acquire(&target, &fast_config(), &LockRegistry::new()).await.unwrap();
        assert!(guard.marker().is_dir());
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("playbook.yaml");
        let config = LockConfig {
            stale_threshold_ms: 300,
            retry_delay_ms: 10,
            max_retries: 5,
            heartbeat_interval_ms: 50,
        };
        let guard = LockGuard::acquire(&target, &config, &LockRegistry::new()).await.unwrap();
        std::fs::File::open(guard.marker())
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let age = marker_age(guard.marker()).unwrap();
        assert!(age < Duration::from_secs(5), "marker not refreshed: {:?}", age);
    }
}
