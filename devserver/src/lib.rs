//! Development server for the request-handler runner
//!
//! A single-process [`runner::NativeServer`] built on axum. It fires the
//! same lifecycle callbacks a prefork server would, so applications can be
//! run locally and exercised end to end without a multi-process host.

pub mod app;
pub mod server;
pub mod state;
pub mod ticks;
pub mod web;

pub use app::EchoHandler;
pub use server::{LocalServer, WORKER_ID};
pub use state::LocalServerHandle;
