//! Service implementations
//!
//! Production implementations of the collaborator traits the runner is
//! composed from.

pub mod access_log;
pub mod control;
pub mod emitter;
pub mod hot_reload;
pub mod marshal;
pub mod pid_file;
pub mod process_title;
pub mod static_files;

#[cfg(test)]
pub(crate) mod tests;

// Re-export service implementations
pub use access_log::{AccessLogEntry, AccessLogFormatter, TracingAccessLogger};
pub use control::{ServerControl, ServerStatus, StopOutcome};
pub use emitter::{ResponseEmitter, CHUNK_SIZE};
pub use hot_reload::{NotifyFileWatcher, Reloader, WatcherFactory};
pub use marshal::{
    default_error_response_factory, default_request_factory, error_response, marshal_request, RemoteAddr,
};
pub use pid_file::FilePidStore;
pub use process_title::OsProcessTitle;
pub use static_files::FileSystemStaticHandler;
