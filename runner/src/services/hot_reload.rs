//! Hot code reload
//!
//! The reloader registers a timer on worker 0. Every tick asks the file
//! watcher for changed paths and, when there are any, asks the server to
//! restart its workers.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use shared::{process_debug, process_error, process_warn, ProcessRole};

use crate::error::{RunnerError, RunnerResult};
use crate::traits::{AccessLogger, FileWatcher, HotCodeReloader, ServerHandle};

pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_millis(500);

/// Creates the file watcher inside the worker that polls it
pub type WatcherFactory = Arc<dyn Fn() -> RunnerResult<Arc<dyn FileWatcher>> + Send + Sync>;

/// Reloads workers when watched files change
///
/// Worker 0 builds its own watcher each time it starts; a watcher thread
/// created in the master does not survive the fork into the workers.
pub struct Reloader {
    factory: WatcherFactory,
    paths: Vec<PathBuf>,
    logger: Arc<dyn AccessLogger>,
    interval: Duration,
}

impl Reloader {
    pub fn new(factory: WatcherFactory, logger: Arc<dyn AccessLogger>) -> Self {
        Self {
            factory,
            paths: Vec::new(),
            logger,
            interval: DEFAULT_RELOAD_INTERVAL,
        }
    }

    /// Reloader backed by [`NotifyFileWatcher`]
    pub fn with_notify(logger: Arc<dyn AccessLogger>) -> Self {
        let factory: WatcherFactory = Arc::new(|| {
            let watcher: Arc<dyn FileWatcher> = Arc::new(NotifyFileWatcher::new()?);
            Ok(watcher)
        });
        Self::new(factory, logger)
    }

    /// Configure the polling interval (fluent API)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Add paths to the watch list (fluent API)
    pub fn with_paths<P: AsRef<Path>>(mut self, paths: &[P]) -> Self {
        self.paths.extend(paths.iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn on_tick(watcher: &dyn FileWatcher, logger: &dyn AccessLogger, server: &dyn ServerHandle) {
        let changed = watcher.read_changed_paths();
        if changed.is_empty() {
            return;
        }

        let changed_files = changed
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        logger.notice(
            "Reloading due to file changes: {changed_files}",
            &[("changed_files", changed_files)],
        );

        if let Err(e) = server.reload() {
            process_error!(ProcessRole::current(), "Worker reload failed: {}", e);
        }
    }
}

impl HotCodeReloader for Reloader {
    fn on_worker_start(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()> {
        // One timer for the whole pool is enough
        if worker_id != 0 {
            return Ok(());
        }

        let watcher = (self.factory)()?;
        for path in &self.paths {
            watcher.add_path(path)?;
        }

        let logger = Arc::clone(&self.logger);
        server.tick(
            self.interval,
            Box::new(move |server: &dyn ServerHandle| Self::on_tick(watcher.as_ref(), logger.as_ref(), server)),
        )?;

        process_debug!(
            ProcessRole::current(),
            "Hot code reload polling {} path(s) every {:?}",
            self.paths.len(),
            self.interval
        );
        Ok(())
    }
}

/// File watcher backed by the platform notification API
pub struct NotifyFileWatcher {
    watcher: Mutex<RecommendedWatcher>,
    events: Mutex<mpsc::UnboundedReceiver<notify::Result<Event>>>,
}

impl NotifyFileWatcher {
    pub fn new() -> RunnerResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| RunnerError::WatcherError {
            message: format!("Failed to create file watcher: {e}"),
        })?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            events: Mutex::new(rx),
        })
    }
}

impl FileWatcher for NotifyFileWatcher {
    fn add_path(&self, path: &Path) -> RunnerResult<()> {
        let mut watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner());
        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| RunnerError::WatcherError {
                message: format!("Failed to watch {}: {e}", path.display()),
            })
    }

    fn read_changed_paths(&self) -> Vec<PathBuf> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut changed = BTreeSet::new();

        while let Ok(result) = events.try_recv() {
            match result {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        changed.extend(event.paths);
                    }
                }
                Err(e) => {
                    process_warn!(ProcessRole::current(), "File watcher error: {}", e);
                }
            }
        }

        changed.into_iter().collect()
    }
}
