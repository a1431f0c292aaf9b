//! Shared logging utilities for consistent tracing across all processes

use crate::errors::{SharedError, SharedResult};
use crate::types::ProcessRole;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Crates whose events are shown at the requested level by default
const WORKSPACE_TARGETS: [&str; 4] = ["runner", "devserver", "control", "shared"];

/// Build the default filter directive for a base log level
///
/// `access_log` is the target the default access logger writes to.
pub fn default_filter(base_level: &str) -> String {
    let mut directives: Vec<String> = WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{target}={base_level}"))
        .collect();
    directives.push(format!("access_log={base_level}"));
    directives.push("tower=warn".to_string());
    directives.push("hyper=warn".to_string());
    directives.join(",")
}

/// Initialize tracing subscriber with an optional log level
///
/// `RUST_LOG` takes precedence over the computed default filter.
pub fn init_tracing_with_level(log_level: Option<&str>) -> SharedResult<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let base_level = log_level.unwrap_or("info");
    if !matches!(base_level, "trace" | "debug" | "info" | "warn" | "error") {
        return Err(SharedError::InvalidConfig {
            field: "log_level".to_string(),
            value: base_level.to_string(),
        });
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(base_level)));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| SharedError::TracingInit { message: e.to_string() })
}

/// Initialize tracing subscriber at info level
pub fn init_tracing() -> SharedResult<()> {
    init_tracing_with_level(None)
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for process-aware info logging
#[macro_export]
macro_rules! process_info {
    ($role:expr, $($arg:tt)*) => {
        tracing::info!(
            process = %$role,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware warning logging
#[macro_export]
macro_rules! process_warn {
    ($role:expr, $($arg:tt)*) => {
        tracing::warn!(
            process = %$role,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware error logging
#[macro_export]
macro_rules! process_error {
    ($role:expr, $($arg:tt)*) => {
        tracing::error!(
            process = %$role,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware debug logging
#[macro_export]
macro_rules! process_debug {
    ($role:expr, $($arg:tt)*) => {
        tracing::debug!(
            process = %$role,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(role: &ProcessRole, details: &str) {
    info!(
        process = %role,
        timestamp = format_timestamp(),
        "Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(role: &ProcessRole, reason: &str) {
    info!(
        process = %role,
        timestamp = format_timestamp(),
        "Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(role: &ProcessRole, context: &str, error: &dyn std::fmt::Display) {
    error!(
        process = %role,
        timestamp = format_timestamp(),
        error = %error,
        "{} failed: {}",
        context,
        error
    );
}
