//! Data model shared by the runner and its collaborators

use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use serde::{Deserialize, Serialize};
use shared::ProcessRole;
use std::fmt;
use std::sync::Arc;

use crate::error::RunnerResult;
use crate::traits::{NativeServer, ServerHandle};

/// Master and manager process ids of a running server
///
/// Persisted on `start`, removed on `shutdown`. Absence of the record means
/// the server is not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProcessIdentity {
    pub master_pid: i32,
    pub manager_pid: i32,
}

impl ServerProcessIdentity {
    pub fn new(master_pid: i32, manager_pid: i32) -> Self {
        Self { master_pid, manager_pid }
    }
}

impl fmt::Display for ServerProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "master {} / manager {}", self.master_pid, self.manager_pid)
    }
}

/// Identity of a worker process, derived on every `workerstart`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerIdentity {
    pub worker_id: u32,
    /// Configured size of the request-serving pool
    pub worker_num: u32,
    pub is_task_worker: bool,
}

impl WorkerIdentity {
    /// Ids at or above the configured worker-pool size are task workers
    pub fn new(worker_id: u32, worker_num: u32) -> Self {
        let is_task_worker = matches!(
            ProcessRole::for_worker(worker_id, worker_num),
            ProcessRole::TaskWorker(_)
        );
        Self {
            worker_id,
            worker_num,
            is_task_worker,
        }
    }

    pub fn role(&self) -> ProcessRole {
        ProcessRole::for_worker(self.worker_id, self.worker_num)
    }
}

/// Deterministic OS-visible process names built from a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNamingPolicy {
    prefix: String,
}

impl ProcessNamingPolicy {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}-master`
    pub fn master(&self) -> String {
        self.for_role(ProcessRole::Master)
    }

    /// `{prefix}-worker-{n}` or `{prefix}-task-worker-{n}`
    pub fn worker(&self, worker: &WorkerIdentity) -> String {
        self.for_role(worker.role())
    }

    pub fn for_role(&self, role: ProcessRole) -> String {
        format!("{}-{}", self.prefix, role)
    }
}

/// Kind of worker lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerEventKind {
    Started,
    Stopped,
    Errored,
}

impl fmt::Display for WorkerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerEventKind::Started => write!(f, "worker-start"),
            WorkerEventKind::Stopped => write!(f, "worker-stop"),
            WorkerEventKind::Errored => write!(f, "worker-error"),
        }
    }
}

/// Worker lifecycle event handed to every registered listener
///
/// Built once per native callback and consumed synchronously before the
/// callback returns.
#[derive(Clone, Copy)]
pub struct WorkerEvent<'a> {
    kind: WorkerEventKind,
    server: &'a dyn ServerHandle,
    worker: WorkerIdentity,
}

impl<'a> WorkerEvent<'a> {
    pub fn new(kind: WorkerEventKind, server: &'a dyn ServerHandle, worker: WorkerIdentity) -> Self {
        Self { kind, server, worker }
    }

    pub fn started(server: &'a dyn ServerHandle, worker: WorkerIdentity) -> Self {
        Self::new(WorkerEventKind::Started, server, worker)
    }

    pub fn stopped(server: &'a dyn ServerHandle, worker: WorkerIdentity) -> Self {
        Self::new(WorkerEventKind::Stopped, server, worker)
    }

    pub fn errored(server: &'a dyn ServerHandle, worker: WorkerIdentity) -> Self {
        Self::new(WorkerEventKind::Errored, server, worker)
    }

    pub fn kind(&self) -> WorkerEventKind {
        self.kind
    }

    pub fn server(&self) -> &'a dyn ServerHandle {
        self.server
    }

    pub fn worker(&self) -> WorkerIdentity {
        self.worker
    }
}

impl fmt::Debug for WorkerEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerEvent")
            .field("kind", &self.kind)
            .field("worker", &self.worker)
            .field("server", &format_args!("{}:{}", self.server.host(), self.server.port()))
            .finish()
    }
}

/// Description of a response already written by the static short-circuit
#[derive(Debug, Clone, PartialEq)]
pub struct StaticResourceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_length: u64,
    /// False for `HEAD`, `OPTIONS` and conditional `304` answers
    pub send_content: bool,
}

impl StaticResourceResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content_length: 0,
            send_content: false,
        }
    }

    /// Bytes actually sent in the body
    pub fn body_size(&self) -> u64 {
        if self.send_content {
            self.content_length
        } else {
            0
        }
    }
}

/// Which path a single request took through the runner
#[derive(Debug)]
pub enum RequestOutcome {
    /// Served by the static short-circuit; the application never saw it
    StaticallyServed(StaticResourceResponse),
    /// Built into an application request and answered by the handler
    ApplicationHandled(Response<Bytes>),
    /// Request construction failed; an error response was emitted instead
    RequestConstructionFailed {
        error: anyhow::Error,
        response: Response<Bytes>,
    },
}

impl RequestOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestOutcome::StaticallyServed(response) => response.status,
            RequestOutcome::ApplicationHandled(response) => response.status(),
            RequestOutcome::RequestConstructionFailed { response, .. } => response.status(),
        }
    }
}

/// Names of the native lifecycle events the runner binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Start,
    WorkerStart,
    WorkerStop,
    WorkerError,
    Request,
    Shutdown,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Start => "start",
            LifecycleEvent::WorkerStart => "workerstart",
            LifecycleEvent::WorkerStop => "workerstop",
            LifecycleEvent::WorkerError => "workererror",
            LifecycleEvent::Request => "request",
            LifecycleEvent::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type ServerCallback<S> = Arc<dyn Fn(&S) -> RunnerResult<()> + Send + Sync>;
pub type WorkerCallback<S> = Arc<dyn Fn(&S, u32) -> RunnerResult<()> + Send + Sync>;
pub type RequestCallback<S> = Arc<
    dyn Fn(&<S as NativeServer>::Request, &mut <S as NativeServer>::Response) -> RunnerResult<()>
        + Send
        + Sync,
>;

/// Fixed table of the six lifecycle callback slots
///
/// Bound once when the runner starts; an `Err` returned from any slot is
/// the native server's unhandled-fault path.
pub struct ServerCallbacks<S: NativeServer> {
    pub start: ServerCallback<S>,
    pub worker_start: WorkerCallback<S>,
    pub worker_stop: WorkerCallback<S>,
    pub worker_error: WorkerCallback<S>,
    pub request: RequestCallback<S>,
    pub shutdown: ServerCallback<S>,
}

impl<S: NativeServer> Clone for ServerCallbacks<S> {
    fn clone(&self) -> Self {
        Self {
            start: Arc::clone(&self.start),
            worker_start: Arc::clone(&self.worker_start),
            worker_stop: Arc::clone(&self.worker_stop),
            worker_error: Arc::clone(&self.worker_error),
            request: Arc::clone(&self.request),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}
