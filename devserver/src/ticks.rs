//! Worker timers
//!
//! Timers registered through `ServerHandle::tick` are driven by the server
//! loop, which polls for due timers at a fixed resolution.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use runner::{RunnerError, RunnerResult, ServerHandle, TickCallback};

/// Granularity at which the server loop checks for due timers
pub const TICK_RESOLUTION: Duration = Duration::from_millis(50);

struct ScheduledTick {
    interval: Duration,
    next_due: Instant,
    callback: TickCallback,
}

/// Timers belonging to the current worker
#[derive(Default)]
pub struct TickScheduler {
    ticks: Mutex<Vec<ScheduledTick>>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, interval: Duration, callback: TickCallback) -> RunnerResult<()> {
        if interval.is_zero() {
            return Err(RunnerError::server("tick interval must be positive"));
        }

        self.lock().push(ScheduledTick {
            interval,
            next_due: Instant::now() + interval,
            callback,
        });
        Ok(())
    }

    /// Drop every timer; used when the worker restarts
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire every timer due at `now`, returning how many fired
    ///
    /// Timers are taken out of the lock while they run, so a callback may
    /// register new timers or ask the server to reload.
    pub fn run_due(&self, now: Instant, server: &dyn ServerHandle) -> usize {
        let mut ticks = std::mem::take(&mut *self.lock());
        let mut fired = 0;

        for tick in ticks.iter_mut().filter(|tick| tick.next_due <= now) {
            (tick.callback)(server);
            tick.next_due = now + tick.interval;
            fired += 1;
        }

        let mut guard = self.lock();
        let added = std::mem::take(&mut *guard);
        *guard = ticks;
        guard.extend(added);
        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledTick>> {
        self.ticks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler").field("ticks", &self.len()).finish()
    }
}
