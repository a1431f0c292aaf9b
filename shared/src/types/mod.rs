//! Process identity types shared by every component

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

use crate::errors::SharedError;

/// Role of the current process - updated at every lifecycle entry point
static CURRENT_ROLE: RwLock<ProcessRole> = RwLock::new(ProcessRole::Unassigned);

/// Role a process plays inside the multi-process server
///
/// Workers are forked from the manager, which is itself forked from the
/// master, so a freshly forked child inherits its parent's role until the
/// runner assigns the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessRole {
    /// No lifecycle event has been observed yet
    Unassigned,
    /// Top-level process owning the listening socket
    Master,
    /// Process that forks and supervises workers
    Manager,
    /// Request-serving worker
    Worker(u32),
    /// Background task worker
    TaskWorker(u32),
}

impl ProcessRole {
    /// Classify a worker id against the configured worker-pool size
    ///
    /// Ids at or above the pool size belong to task workers.
    pub fn for_worker(worker_id: u32, worker_num: u32) -> Self {
        if worker_id >= worker_num {
            ProcessRole::TaskWorker(worker_id)
        } else {
            ProcessRole::Worker(worker_id)
        }
    }

    /// Record this as the role of the current process
    pub fn set_current(self) {
        let mut current = CURRENT_ROLE.write().unwrap_or_else(|e| e.into_inner());
        *current = self;
    }

    /// Role of the current process
    pub fn current() -> ProcessRole {
        *CURRENT_ROLE.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRole::Unassigned => write!(f, "unassigned"),
            ProcessRole::Master => write!(f, "master"),
            ProcessRole::Manager => write!(f, "manager"),
            ProcessRole::Worker(id) => write!(f, "worker-{id}"),
            ProcessRole::TaskWorker(id) => write!(f, "task-worker-{id}"),
        }
    }
}

impl std::str::FromStr for ProcessRole {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SharedError::InvalidProcessRole { input: s.to_string() };

        match s {
            "unassigned" => Ok(ProcessRole::Unassigned),
            "master" => Ok(ProcessRole::Master),
            "manager" => Ok(ProcessRole::Manager),
            _ => {
                if let Some(id) = s.strip_prefix("task-worker-") {
                    id.parse().map(ProcessRole::TaskWorker).map_err(|_| invalid())
                } else if let Some(id) = s.strip_prefix("worker-") {
                    id.parse().map(ProcessRole::Worker).map_err(|_| invalid())
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

impl Default for ProcessRole {
    fn default() -> Self {
        ProcessRole::Unassigned
    }
}
