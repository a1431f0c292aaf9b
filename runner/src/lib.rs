//! Request-handler runner
//!
//! Bridges a multi-process, event-driven native HTTP server to a synchronous
//! `Request -> Response` application handler, with PID bookkeeping, a static
//! file short-circuit, worker lifecycle events, access logging and hot code
//! reload.

pub mod buffered;
pub mod config;
pub mod error;
pub mod events;
pub mod runner;
pub mod services;
pub mod traits;
pub mod types;

pub use buffered::{BufferedRequest, BufferedResponse};
pub use config::{HotReloadConfig, RunnerConfig, StaticFilesConfig};
pub use error::{RunnerError, RunnerResult};
pub use events::{ListenerRegistry, WorkerDispatcher};
pub use runner::{RequestHandlerRunner, RunnerBuilder};
pub use services::{
    FilePidStore, FileSystemStaticHandler, NotifyFileWatcher, OsProcessTitle, Reloader, ServerControl, ServerStatus,
    StopOutcome, TracingAccessLogger,
};
pub use traits::*;
pub use types::*;
