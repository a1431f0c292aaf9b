//! Collaborator trait definitions
//!
//! The runner only talks to the native server, the application and the
//! operational stores through these traits. Simple ones carry mockall
//! annotations for tests.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RunnerResult;
use crate::types::{
    ServerCallbacks, ServerProcessIdentity, StaticResourceResponse, WorkerEvent, WorkerEventKind,
};

/// Periodic timer callback registered through [`ServerHandle::tick`]
pub type TickCallback = Box<dyn FnMut(&dyn ServerHandle) + Send>;

/// View of the native server handed to lifecycle callbacks and listeners
pub trait ServerHandle: Send + Sync {
    /// Master process id, zero until the server has started
    fn master_pid(&self) -> i32;

    /// Manager process id, zero until the server has started
    fn manager_pid(&self) -> i32;

    fn host(&self) -> &str;

    fn port(&self) -> u16;

    /// Configured size of the request-serving worker pool
    fn worker_num(&self) -> u32;

    /// Ask the server to restart its workers
    fn reload(&self) -> RunnerResult<()>;

    /// Run `callback` every `interval` inside the current worker
    fn tick(&self, interval: Duration, callback: TickCallback) -> RunnerResult<()>;
}

/// Multi-process, event-driven server the runner attaches to
///
/// Owns the event loop, forking and sockets. The runner registers the
/// callback table once and then hands control to [`NativeServer::start`].
pub trait NativeServer: ServerHandle + Sized + 'static {
    type Request: RawRequest + 'static;
    type Response: RawResponse + 'static;

    /// Bind the lifecycle callback table
    fn on(&mut self, callbacks: ServerCallbacks<Self>);

    /// Block until the server has fully shut down
    fn start(&mut self) -> RunnerResult<()>;
}

/// Request as delivered by the native server
pub trait RawRequest: Send + Sync {
    fn method(&self) -> &Method;

    fn uri(&self) -> &Uri;

    fn version(&self) -> Version;

    fn headers(&self) -> &HeaderMap;

    fn remote_addr(&self) -> Option<SocketAddr>;

    fn body(&self) -> &[u8];

    /// Moment the server accepted the request, when known
    fn received_at(&self) -> Option<Instant> {
        None
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }
}

/// Response object owned by the native server
pub trait RawResponse: Send {
    fn set_status(&mut self, status: StatusCode);

    fn append_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Send a body chunk
    fn write(&mut self, chunk: &[u8]) -> std::io::Result<()>;

    /// Finish the response, optionally with a last chunk
    fn end(&mut self, chunk: Option<&[u8]>) -> std::io::Result<()>;
}

/// Application request handler
#[mockall::automock]
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: Request<Bytes>) -> anyhow::Result<Response<Bytes>>;
}

/// Builds an application request from a raw native request
pub type RequestFactory = Arc<dyn Fn(&dyn RawRequest) -> anyhow::Result<Request<Bytes>> + Send + Sync>;

/// Turns a request-construction failure into a response; must not fail
pub type ErrorResponseFactory = Arc<dyn Fn(&anyhow::Error) -> Response<Bytes> + Send + Sync>;

/// Durable record of the master/manager process ids
#[mockall::automock]
pub trait PidStore: Send + Sync {
    /// Persist both ids atomically
    fn write(&self, master_pid: i32, manager_pid: i32) -> RunnerResult<()>;

    fn read(&self) -> RunnerResult<Option<ServerProcessIdentity>>;

    /// Remove the record; succeeds when it is already gone
    fn delete(&self) -> RunnerResult<()>;
}

/// Per-request access log plus lifecycle notices
pub trait AccessLogger: Send + Sync {
    fn log_access_for_static_resource(&self, request: &dyn RawRequest, response: &StaticResourceResponse);

    fn log_access_for_response(&self, request: &dyn RawRequest, response: &Response<Bytes>);

    /// Free-text notice; `{key}` placeholders are filled from `context`
    fn notice(&self, message: &str, context: &[(&str, String)]);
}

/// Fast path serving static assets before the application runs
pub trait StaticResourceHandler: Send + Sync {
    /// Returns `Some` only when the response has already been written
    fn process_static_resource(
        &self,
        request: &dyn RawRequest,
        response: &mut dyn RawResponse,
    ) -> Option<StaticResourceResponse>;
}

/// Hot code reload hook, notified on every worker start
pub trait HotCodeReloader: Send + Sync {
    fn on_worker_start(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()>;
}

/// Source of changed file paths for hot code reload
#[mockall::automock]
pub trait FileWatcher: Send + Sync {
    fn add_path(&self, path: &Path) -> RunnerResult<()>;

    /// Paths changed since the previous call
    fn read_changed_paths(&self) -> Vec<PathBuf>;
}

/// Sets the OS-visible name of the current process
#[mockall::automock]
pub trait ProcessTitle: Send + Sync {
    fn set(&self, name: &str);
}

/// Listener invoked for a worker lifecycle event
pub type WorkerListener = Arc<dyn Fn(&WorkerEvent<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Resolves the listeners registered for an event kind, in registration order
pub trait WorkerListenerProvider: Send + Sync {
    fn listeners_for(&self, kind: WorkerEventKind) -> Vec<WorkerListener>;
}
