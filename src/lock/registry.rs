//! Process-scoped record of held lock markers

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Shared handle to the set of lock markers this process currently holds.
///
/// Cloning is cheap; every clone sees the same set. The shutdown path calls
/// [`LockRegistry::release_all`] to remove markers whose guards never ran.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    held: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> MutexGuard<'_, BTreeSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, marker: &Path) {
        self.set().insert(marker.to_path_buf());
    }

    pub(crate) fn unregister(&self, marker: &Path) {
        self.set().remove(marker);
    }

    pub fn is_held(&self, marker: &Path) -> bool {
        self.set().contains(marker)
    }

    /// Markers currently held, sorted
    pub fn held(&self) -> Vec<PathBuf> {
        self.set().iter().cloned().collect()
    }

    /// Remove every marker still registered and return how many were swept
    pub fn release_all(&self) -> usize {
        let markers: Vec<PathBuf> = std::mem::take(&mut *self.set()).into_iter().collect();
        for marker in &markers {
            match std::fs::remove_dir_all(marker) {
                Ok(()) => info!("Released lock {} at shutdown", marker.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to release lock {}: {}", marker.display(), e),
            }
        }
        markers.len()
    }
}
