//! Shared types for the prefork runner workspace
//!
//! Contains the pieces every process in the system needs regardless of its
//! role: the process role used to tag log output, tracing initialisation and
//! the shared error type.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
