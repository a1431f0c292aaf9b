//! Shared error types for the prefork runner workspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Invalid process role: {input}")]
    InvalidProcessRole { input: String },

    #[error("Tracing initialisation failed: {message}")]
    TracingInit { message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
