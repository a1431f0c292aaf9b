//! Runner-specific error types

use std::path::{Path, PathBuf};
use thiserror::Error;
use shared::SharedError;

use crate::types::WorkerEventKind;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("The server has already been started (master pid {master_pid}, manager pid {manager_pid})")]
    ServerAlreadyStarted { master_pid: i32, manager_pid: i32 },

    #[error("PID file operation failed: {operation} on {}", path.display())]
    PidFileError {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid PID file contents in {}: {contents:?}", path.display())]
    InvalidPidFile { path: PathBuf, contents: String },

    #[error("Worker listener failed while dispatching {event} for worker {worker_id}")]
    ListenerFailed {
        event: WorkerEventKind,
        worker_id: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Request handler failed")]
    HandlerFailed(#[source] anyhow::Error),

    #[error("Response emission failed: {message}")]
    EmitFailed { message: String },

    #[error("Native server error: {message}")]
    ServerError { message: String },

    #[error("Process control failed: {message}")]
    ControlError { message: String },

    #[error("File watcher error: {message}")]
    WatcherError { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RunnerError {
    pub fn pid_file(operation: &str, path: &Path, source: std::io::Error) -> Self {
        RunnerError::PidFileError {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn emit(message: impl Into<String>) -> Self {
        RunnerError::EmitFailed { message: message.into() }
    }

    pub fn server(message: impl Into<String>) -> Self {
        RunnerError::ServerError { message: message.into() }
    }

    pub fn control(message: impl Into<String>) -> Self {
        RunnerError::ControlError { message: message.into() }
    }

    pub fn config(field: impl Into<String>) -> Self {
        RunnerError::ConfigurationError { field: field.into() }
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;
