//! Synchronous dispatcher for worker lifecycle events

use std::sync::Arc;

use shared::{process_debug, ProcessRole};

use crate::error::{RunnerError, RunnerResult};
use crate::traits::WorkerListenerProvider;
use crate::types::WorkerEvent;

/// Fans a worker event out to every listener the provider returns
///
/// Listeners run in registration order. The first failing listener aborts
/// the remaining fan-out and its error is returned to the caller.
#[derive(Clone)]
pub struct WorkerDispatcher {
    provider: Arc<dyn WorkerListenerProvider>,
}

impl WorkerDispatcher {
    pub fn new(provider: Arc<dyn WorkerListenerProvider>) -> Self {
        Self { provider }
    }

    pub fn dispatch(&self, event: &WorkerEvent<'_>) -> RunnerResult<()> {
        let listeners = self.provider.listeners_for(event.kind());

        process_debug!(
            ProcessRole::current(),
            "Dispatching {} for worker {} to {} listener(s)",
            event.kind(),
            event.worker().worker_id,
            listeners.len()
        );

        for listener in listeners {
            listener(event).map_err(|source| RunnerError::ListenerFailed {
                event: event.kind(),
                worker_id: event.worker().worker_id,
                source,
            })?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for WorkerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDispatcher").finish_non_exhaustive()
    }
}
