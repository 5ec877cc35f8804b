//! Descriptor accounting for PTY tasks
//!
//! Kept in its own test binary with a single test: anything running in
//! parallel would open and close descriptors underneath the count.

#![cfg(target_os = "linux")]

use relay_foundation::{RelayConfig, SurfaceKind};
use relay_task::{ExecutionSurface, PtySurface, TaskManager, TaskManagerConfig, TaskStatus};
use std::sync::Arc;
use std::time::Duration;

const TASKS: usize = 20;

fn open_descriptors() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_pty_tasks_release_descriptors() {
    let config = RelayConfig::default().surface(SurfaceKind::Pty).shell("sh");
    let surface = PtySurface::from_config(&config);

    if surface.acquire().is_err() {
        println!("PTY not available; skipping");
        return;
    }

    let manager = TaskManager::new(Arc::new(surface), TaskManagerConfig::from(&config));

    // Warm up the blocking pool and lazily opened descriptors
    let id = manager.submit("true", None).unwrap().task_id.to_string();
    manager.wait(&id, Duration::from_secs(10)).await.unwrap();
    let before = open_descriptors();

    for i in 0..TASKS {
        let id = manager
            .submit(&format!("echo run {}", i), None)
            .unwrap()
            .task_id
            .to_string();
        let done = manager.wait(&id, Duration::from_secs(10)).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    let after = open_descriptors();
    println!("Descriptors before: {}, after {} tasks: {}", before, TASKS, after);

    // Finished tasks stay in the registry but must not pin their terminals
    assert!(
        after <= before + 2,
        "descriptors grew from {} to {} over {} tasks",
        before,
        after,
        TASKS
    );
    assert_eq!(manager.stats().total, TASKS + 1);

    // A cancelled command is stopped by Ctrl-C; the terminal closes after it
    let before = open_descriptors();
    let id = manager.submit("sleep 30", None).unwrap().task_id.to_string();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(manager.cancel(&id).is_cancelled());

    let mut after = open_descriptors();
    for _ in 0..200 {
        if after <= before + 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
        after = open_descriptors();
    }

    assert!(
        after <= before + 2,
        "descriptors grew from {} to {} after cancel",
        before,
        after
    );
}
