//! Process titles as seen by operators
//!
//! Kept in its own test binary since it rewrites the process-wide command
//! line.

#![cfg(target_os = "linux")]

use runner::{OsProcessTitle, ProcessNamingPolicy, ProcessTitle, WorkerIdentity};

fn visible_title() -> String {
    let cmdline = std::fs::read("/proc/self/cmdline").unwrap();
    let title = cmdline.split(|byte| *byte == 0).next().unwrap_or_default();
    String::from_utf8_lossy(title).into_owned()
}

#[test]
fn test_worker_titles_are_not_truncated() {
    // Arrange
    let policy = ProcessNamingPolicy::new("runner");
    let title = OsProcessTitle::new();
    let mut seen = Vec::new();

    // Act
    for worker_id in [1, 10, 16, 17] {
        title.set(&policy.worker(&WorkerIdentity::new(worker_id, 16)));
        seen.push(visible_title());
    }

    // Assert
    assert_eq!(
        seen,
        vec![
            "runner-worker-1",
            "runner-worker-10",
            "runner-task-worker-16",
            "runner-task-worker-17",
        ]
    );
    let comm = std::fs::read_to_string("/proc/thread-self/comm").unwrap();
    assert_eq!(comm.trim_end(), "runner-task-wor");
}
