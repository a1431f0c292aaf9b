//! Worker lifecycle event fan-out

pub mod dispatcher;
pub mod provider;

pub use dispatcher::WorkerDispatcher;
pub use provider::ListenerRegistry;
