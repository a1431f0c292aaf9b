//! Single-process native server
//!
//! Plays master, manager and the only worker in one process: the lifecycle
//! callbacks fire in the same order a prefork server would fire them, which
//! makes it suitable for local development and end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use runner::{
    BufferedRequest, BufferedResponse, LifecycleEvent, NativeServer, RunnerConfig, RunnerError, RunnerResult,
    ServerCallbacks, ServerHandle, TickCallback,
};
use shared::{logging, process_debug, process_error, process_info, process_warn, ProcessRole};

use crate::web::{build_router, error_chain, AppState};
use crate::state::{LocalServerHandle, ServerState};
use crate::ticks::{TickScheduler, TICK_RESOLUTION};

/// The development server runs exactly one request worker
pub const WORKER_ID: u32 = 0;

pub struct LocalServer {
    host: String,
    port: u16,
    max_conn: usize,
    master_pid: i32,
    manager_pid: i32,
    callbacks: Option<ServerCallbacks<LocalServer>>,
    ticks: TickScheduler,
    state: Arc<ServerState>,
}

impl LocalServer {
    /// Port 0 binds an ephemeral port, reported by [`ServerHandle::port`]
    /// once started
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_conn: 1024,
            master_pid: 0,
            manager_pid: 0,
            callbacks: None,
            ticks: TickScheduler::new(),
            state: Arc::new(ServerState::new()),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        if config.worker_num > 1 || config.task_worker_num > 0 {
            process_warn!(
                ProcessRole::current(),
                "Development server runs a single worker; ignoring worker_num={} task_worker_num={}",
                config.worker_num,
                config.task_worker_num
            );
        }
        Self::new(config.host.clone(), config.port).with_max_conn(config.max_conn)
    }

    /// Maximum number of requests served concurrently (fluent API)
    pub fn with_max_conn(mut self, max_conn: usize) -> Self {
        self.max_conn = max_conn.max(1);
        self
    }

    /// Control handle usable from other threads
    pub fn handle(&self) -> LocalServerHandle {
        LocalServerHandle::new(Arc::clone(&self.state))
    }

    async fn serve(&mut self, callbacks: ServerCallbacks<LocalServer>) -> RunnerResult<()> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| RunnerError::server(format!("Failed to bind to {}:{}: {}", self.host, self.port, e)))?;
        let local_addr = listener.local_addr()?;

        let pid = std::process::id() as i32;
        self.port = local_addr.port();
        self.master_pid = pid;
        self.manager_pid = pid;

        let result = self.run_lifecycle(&callbacks, listener, local_addr).await;

        self.master_pid = 0;
        self.manager_pid = 0;
        self.state.mark_stopped();
        result
    }

    async fn run_lifecycle(
        &self,
        callbacks: &ServerCallbacks<LocalServer>,
        listener: TcpListener,
        local_addr: SocketAddr,
    ) -> RunnerResult<()> {
        (callbacks.start)(self)?;
        spawn_signal_listeners(Arc::clone(&self.state));

        self.fault(
            LifecycleEvent::WorkerStart,
            (callbacks.worker_start)(self, WORKER_ID),
        );

        let router = build_router(
            AppState {
                request: Arc::clone(&callbacks.request),
                server: Arc::clone(&self.state),
            },
            self.max_conn,
        );
        let (graceful_tx, graceful_rx) = oneshot::channel::<()>();
        let mut http_task = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = graceful_rx.await;
                })
                .await
        });

        self.state.mark_ready(local_addr);
        logging::log_startup(&ProcessRole::current(), &format!("listening on http://{local_addr}"));

        let mut ticker = tokio::time::interval(TICK_RESOLUTION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut http_finished = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.ticks.run_due(Instant::now(), self);
                }
                _ = self.state.reload_requested() => {
                    self.restart_worker(callbacks);
                }
                _ = self.state.shutdown_requested() => {
                    break;
                }
                joined = &mut http_task => {
                    http_finished = true;
                    match joined {
                        Ok(Ok(())) => process_warn!(ProcessRole::current(), "HTTP listener stopped unexpectedly"),
                        Ok(Err(e)) => process_error!(ProcessRole::current(), "HTTP listener failed: {}", e),
                        Err(e) => process_error!(ProcessRole::current(), "HTTP listener task failed: {}", e),
                    }
                    break;
                }
            }
        }

        if !http_finished {
            let _ = graceful_tx.send(());
            match http_task.await {
                Ok(Ok(())) => process_debug!(ProcessRole::current(), "HTTP listener drained"),
                Ok(Err(e)) => process_error!(ProcessRole::current(), "HTTP listener failed: {}", e),
                Err(e) => process_error!(ProcessRole::current(), "HTTP listener task failed: {}", e),
            }
        }

        self.fault(LifecycleEvent::WorkerStop, (callbacks.worker_stop)(self, WORKER_ID));
        self.ticks.clear();

        (callbacks.shutdown)(self)?;
        logging::log_shutdown(
            &ProcessRole::current(),
            &format!("served {} request(s)", self.state.requests_served()),
        );
        Ok(())
    }

    /// `workerstop` then `workerstart` for the single worker
    fn restart_worker(&self, callbacks: &ServerCallbacks<LocalServer>) {
        process_info!(ProcessRole::current(), "Restarting worker {}", WORKER_ID);

        self.fault(LifecycleEvent::WorkerStop, (callbacks.worker_stop)(self, WORKER_ID));
        self.ticks.clear();
        self.fault(
            LifecycleEvent::WorkerStart,
            (callbacks.worker_start)(self, WORKER_ID),
        );
    }

    /// Unhandled callback errors are logged and the server keeps running
    fn fault(&self, event: LifecycleEvent, result: RunnerResult<()>) {
        if let Err(e) = result {
            process_error!(
                ProcessRole::current(),
                "Unhandled error in {} callback: {}",
                event,
                error_chain(&e)
            );
        }
    }
}

impl std::fmt::Debug for LocalServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalServer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_conn", &self.max_conn)
            .field("master_pid", &self.master_pid)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl ServerHandle for LocalServer {
    fn master_pid(&self) -> i32 {
        self.master_pid
    }

    fn manager_pid(&self) -> i32 {
        self.manager_pid
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn worker_num(&self) -> u32 {
        1
    }

    fn reload(&self) -> RunnerResult<()> {
        self.state.request_reload();
        Ok(())
    }

    fn tick(&self, interval: Duration, callback: TickCallback) -> RunnerResult<()> {
        self.ticks.schedule(interval, callback)
    }
}

impl NativeServer for LocalServer {
    type Request = BufferedRequest;
    type Response = BufferedResponse;

    fn on(&mut self, callbacks: ServerCallbacks<Self>) {
        self.callbacks = Some(callbacks);
    }

    fn start(&mut self) -> RunnerResult<()> {
        let callbacks = self
            .callbacks
            .clone()
            .ok_or_else(|| RunnerError::server("start called before callbacks were registered"))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve(callbacks))
    }
}

/// Ctrl-C and SIGTERM stop the server, SIGUSR1 restarts the worker
fn spawn_signal_listeners(state: Arc<ServerState>) {
    let on_ctrl_c = Arc::clone(&state);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                process_info!(ProcessRole::current(), "Received Ctrl+C signal");
                on_ctrl_c.request_shutdown();
            }
            Err(e) => logging::log_error(&ProcessRole::current(), "Signal handling", &e),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let on_term = Arc::clone(&state);
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    if terminate.recv().await.is_some() {
                        process_info!(ProcessRole::current(), "Received SIGTERM");
                        on_term.request_shutdown();
                    }
                }
                Err(e) => logging::log_error(&ProcessRole::current(), "SIGTERM handler", &e),
            }
        });

        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut reload) => {
                    while reload.recv().await.is_some() {
                        process_info!(ProcessRole::current(), "Received SIGUSR1, reloading worker");
                        state.request_reload();
                    }
                }
                Err(e) => logging::log_error(&ProcessRole::current(), "SIGUSR1 handler", &e),
            }
        });
    }
}
