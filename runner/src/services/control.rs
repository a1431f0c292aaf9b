//! Operational control of a running server through its PID record

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use shared::{process_debug, process_warn, ProcessRole};

use crate::error::{RunnerError, RunnerResult};
use crate::traits::PidStore;
use crate::types::ServerProcessIdentity;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Liveness as seen by operational tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Running(ServerProcessIdentity),
    Stopped,
}

impl ServerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ServerStatus::Running(_))
    }
}

/// What `stop` had to do to bring the server down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Terminated,
    Killed,
}

/// Start/stop/status/reload operations over a PID store
pub struct ServerControl {
    pid_store: Arc<dyn PidStore>,
}

impl ServerControl {
    pub fn new(pid_store: Arc<dyn PidStore>) -> Self {
        Self { pid_store }
    }

    /// Running when the record exists and its master answers signal 0
    ///
    /// A record left behind by a crashed master reads as stopped.
    pub fn status(&self) -> RunnerResult<ServerStatus> {
        match self.pid_store.read()? {
            Some(identity) if identity.master_pid > 0 && process_exists(identity.master_pid)? => {
                Ok(ServerStatus::Running(identity))
            }
            Some(identity) => {
                process_debug!(
                    ProcessRole::current(),
                    "Stale PID record ({}), master is gone",
                    identity
                );
                Ok(ServerStatus::Stopped)
            }
            None => Ok(ServerStatus::Stopped),
        }
    }

    /// Send SIGTERM to the master and wait for it to exit
    ///
    /// Falls back to SIGKILL once `timeout` has elapsed. The PID record is
    /// removed in every case where the master is gone afterwards.
    pub async fn stop(&self, timeout: Duration) -> RunnerResult<StopOutcome> {
        let identity = match self.status()? {
            ServerStatus::Running(identity) => identity,
            ServerStatus::Stopped => {
                self.pid_store.delete()?;
                return Ok(StopOutcome::NotRunning);
            }
        };

        send_signal(identity.master_pid, Signal::Terminate)?;

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !process_exists(identity.master_pid)? {
                self.pid_store.delete()?;
                return Ok(StopOutcome::Terminated);
            }
            sleep(STOP_POLL_INTERVAL).await;
        }

        process_warn!(
            ProcessRole::current(),
            "Master {} did not exit within {:?}, sending SIGKILL",
            identity.master_pid,
            timeout
        );
        send_signal(identity.master_pid, Signal::Kill)?;
        sleep(STOP_POLL_INTERVAL * 2).await;

        if process_exists(identity.master_pid)? {
            return Err(RunnerError::control(format!(
                "master {} still running after SIGKILL",
                identity.master_pid
            )));
        }

        self.pid_store.delete()?;
        Ok(StopOutcome::Killed)
    }

    /// Ask the running master to restart its workers (SIGUSR1)
    pub fn reload(&self) -> RunnerResult<ServerProcessIdentity> {
        match self.status()? {
            ServerStatus::Running(identity) => {
                send_signal(identity.master_pid, Signal::ReloadWorkers)?;
                Ok(identity)
            }
            ServerStatus::Stopped => Err(RunnerError::control("server is not running")),
        }
    }
}

/// Signals the control operations send to the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
    ReloadWorkers,
}

#[cfg(unix)]
fn to_nix(signal: Signal) -> nix::sys::signal::Signal {
    use nix::sys::signal::Signal as NixSignal;

    match signal {
        Signal::Terminate => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
        Signal::ReloadWorkers => NixSignal::SIGUSR1,
    }
}

/// Deliver a signal to a process
#[cfg(unix)]
pub fn send_signal(pid: i32, signal: Signal) -> RunnerResult<()> {
    use nix::unistd::Pid;

    nix::sys::signal::kill(Pid::from_raw(pid), to_nix(signal))
        .map_err(|e| RunnerError::control(format!("failed to send {signal:?} to {pid}: {e}")))
}

/// Whether a process with this id exists
#[cfg(unix)]
pub fn process_exists(pid: i32) -> RunnerResult<bool> {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    match nix::sys::signal::kill(Pid::from_raw(pid), None) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        // Exists but belongs to another user
        Err(Errno::EPERM) => Ok(true),
        Err(e) => Err(RunnerError::control(format!(
            "error checking if process {pid} exists: {e}"
        ))),
    }
}

#[cfg(not(unix))]
pub fn send_signal(pid: i32, signal: Signal) -> RunnerResult<()> {
    Err(RunnerError::control(format!(
        "cannot send {signal:?} to {pid}: signals are unsupported on this platform"
    )))
}

#[cfg(not(unix))]
pub fn process_exists(pid: i32) -> RunnerResult<bool> {
    Err(RunnerError::control(format!(
        "cannot probe process {pid}: unsupported on this platform"
    )))
}
