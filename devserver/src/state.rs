//! Development server state
//!
//! State shared between the server loop, the HTTP handlers, the signal
//! listeners and any [`LocalServerHandle`] held by other threads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct ServerState {
    reload: Notify,
    shutdown: Notify,
    requests_served: AtomicU64,
    local_addr: Mutex<Option<SocketAddr>>,
    ready: Condvar,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server loop to restart its worker
    pub fn request_reload(&self) {
        self.reload.notify_one();
    }

    /// Ask the server loop to shut down gracefully
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn reload_requested(&self) {
        self.reload.notified().await;
    }

    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }

    pub fn record_request(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    /// Publish the bound address once the worker is serving
    pub fn mark_ready(&self, addr: SocketAddr) {
        let mut local_addr = self.local_addr.lock().unwrap_or_else(|e| e.into_inner());
        *local_addr = Some(addr);
        self.ready.notify_all();
    }

    pub fn mark_stopped(&self) {
        let mut local_addr = self.local_addr.lock().unwrap_or_else(|e| e.into_inner());
        *local_addr = None;
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the server is ready or `timeout` elapses
    pub fn wait_ready(&self, timeout: Duration) -> Option<SocketAddr> {
        let local_addr = self.local_addr.lock().unwrap_or_else(|e| e.into_inner());
        let (local_addr, _) = self
            .ready
            .wait_timeout_while(local_addr, timeout, |addr| addr.is_none())
            .unwrap_or_else(|e| e.into_inner());
        *local_addr
    }
}

/// Cloneable control handle for a running [`crate::LocalServer`]
#[derive(Debug, Clone)]
pub struct LocalServerHandle {
    state: Arc<ServerState>,
}

impl LocalServerHandle {
    pub(crate) fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn reload(&self) {
        self.state.request_reload();
    }

    pub fn shutdown(&self) {
        self.state.request_shutdown();
    }

    pub fn wait_ready(&self, timeout: Duration) -> Option<SocketAddr> {
        self.state.wait_ready(timeout)
    }

    pub fn requests_served(&self) -> u64 {
        self.state.requests_served()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_ready_times_out() {
        let state = ServerState::new();

        assert_eq!(state.wait_ready(Duration::from_millis(20)), None);
    }

    #[test]
    fn test_wait_ready_sees_address_from_other_thread() {
        // Arrange
        let state = Arc::new(ServerState::new());
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let publisher = Arc::clone(&state);

        // Act
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            publisher.mark_ready(addr);
        });
        let seen = state.wait_ready(Duration::from_secs(5));
        thread.join().unwrap();

        // Assert
        assert_eq!(seen, Some(addr));
    }

    #[tokio::test]
    async fn test_shutdown_request_is_not_lost_without_waiter() {
        let state = ServerState::new();

        state.request_shutdown();

        tokio::time::timeout(Duration::from_secs(1), state.shutdown_requested())
            .await
            .expect("stored permit should complete the wait");
    }
}
