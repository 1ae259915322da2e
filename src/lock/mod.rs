//! Cross-process mutual exclusion over store files
//!
//! A lock moves through unlocked, acquiring, held and releasing. Acquiring is
//! [`LockGuard::acquire`]; held is the lifetime of the returned guard;
//! releasing is its `Drop`. Each store file is locked independently.

mod guard;
mod registry;

pub use guard::{marker_path, read_owner, LockGuard, LockOwner};
pub use registry::LockRegistry;

use std::future::Future;
use std::path::Path;

use crate::config::LockConfig;
use crate::error::Result;

/// Run `op` while holding the lock for `target`.
///
/// The lock is released when `op` completes, fails, or the returned future
/// is dropped.
pub async fn with_lock<T, F, Fut>(
    target: &Path,
    config: &LockConfig,
    registry: &LockRegistry,
    op: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let guard = LockGuard::acquire(target, config, registry).await?;
    let outcome = op().await;
    guard.release();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybookError;

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("playbook.yaml");
        let registry = LockRegistry::new();

        let outcome: Result<()> = with_lock(&target, &LockConfig::default(), &registry, || async {
            Err(PlaybookError::InvalidInput("boom".into()))
        })
        .await;

        assert!(outcome.is_err());
        assert!(!marker_path(&target).exists());
        assert!(registry.held().is_empty());
    }

    #[tokio::test]
    async fn test_with_lock_returns_value() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("playbook.yaml");
        let value = with_lock(&target, &LockConfig::default(), &LockRegistry::new(), || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
