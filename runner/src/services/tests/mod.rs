//! Service tests for the runner
//!
//! Unit tests for the collaborator implementations, driven through the
//! in-memory raw request/response types and a stub server handle.

pub mod helpers;
pub mod static_files;
