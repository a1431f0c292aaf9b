//! Default listener provider backed by an in-memory registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::{WorkerListener, WorkerListenerProvider};
use crate::types::{WorkerEvent, WorkerEventKind};

/// Listener registry keyed by event kind
///
/// Listeners are registered before the runner starts and resolved in
/// registration order.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    listeners: HashMap<WorkerEventKind, Vec<WorkerListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind
    pub fn add_listener<F>(&mut self, kind: WorkerEventKind, listener: F)
    where
        F: Fn(&WorkerEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.entry(kind).or_default().push(Arc::new(listener));
    }

    /// Register a listener (fluent API)
    pub fn with_listener<F>(mut self, kind: WorkerEventKind, listener: F) -> Self
    where
        F: Fn(&WorkerEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_listener(kind, listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkerListenerProvider for ListenerRegistry {
    fn listeners_for(&self, kind: WorkerEventKind) -> Vec<WorkerListener> {
        self.listeners.get(&kind).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("ListenerRegistry").field("listeners", &counts).finish()
    }
}
