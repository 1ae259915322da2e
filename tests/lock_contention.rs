//! Cross-task serialization and stale reclaim for store locks

use agent_playbook::config::LockConfig;
use agent_playbook::lock::{marker_path, with_lock, LockRegistry};
use agent_playbook::PlaybookError;
use std::time::{Duration, SystemTime};

fn fast_config() -> LockConfig {
    LockConfig {
        stale_threshold_ms: 30_000,
        retry_delay_ms: 5,
        max_retries: 2_000,
        heartbeat_interval_ms: 10_000,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("counter.txt");
    std::fs::write(&counter, "0").unwrap();
    let registry = LockRegistry::new();

    const WORKERS: usize = 16;
    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let counter = counter.clone();
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let config = fast_config();
            let path = counter.clone();
            with_lock(&counter, &config, &registry, || async move {
                let current: u64 = std::fs::read_to_string(&path)?.trim().parse().unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
                std::fs::write(&path, (current + 1).to_string())?;
                Ok::<_, PlaybookError>(())
            })
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let total: usize = std::fs::read_to_string(&counter).unwrap().trim().parse().unwrap();
    assert_eq!(total, WORKERS);
    assert!(!marker_path(&counter).exists());
    assert!(registry.held().is_empty());
}

#[tokio::test]
async fn test_abandoned_marker_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("playbook.yaml");
    let marker = marker_path(&target);
    std::fs::create_dir(&marker).unwrap();
    std::fs::File::open(&marker)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(300))
        .unwrap();

    let registry = LockRegistry::new();
    let value = with_lock(&target, &LockConfig::default(), &registry, || async { Ok(42) })
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_live_marker_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("playbook.yaml");
    std::fs::create_dir(marker_path(&target)).unwrap();

    let config = LockConfig {
        retry_delay_ms: 1,
        max_retries: 3,
        ..LockConfig::default()
    };
    let err = with_lock(&target, &config, &LockRegistry::new(), || async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybookError::LockTimeout { attempts: 3, .. }));
    assert!(marker_path(&target).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_waiters_reclaim_stale_marker_once() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("counter.txt");
    std::fs::write(&counter, "0").unwrap();
    let registry = LockRegistry::new();

    const WORKERS: usize = 8;
    const ROUNDS: usize = 20;
    for _ in 0..ROUNDS {
        let marker = marker_path(&counter);
        std::fs::create_dir(&marker).unwrap();
        std::fs::File::open(&marker)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(300))
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..WORKERS {
            let counter = counter.clone();
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let path = counter.clone();
                with_lock(&counter, &fast_config(), &registry, || async move {
                    let current: u64 = std::fs::read_to_string(&path)?.trim().parse().unwrap();
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    std::fs::write(&path, (current + 1).to_string())?;
                    Ok::<_, PlaybookError>(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    let total: usize = std::fs::read_to_string(&counter).unwrap().trim().parse().unwrap();
    assert_eq!(total, WORKERS * ROUNDS);
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("counter.txt")]);
}
