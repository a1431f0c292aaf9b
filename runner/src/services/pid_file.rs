//! File-backed PID store
//!
//! The record is a single line `"<master>,<manager>"`. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! record, so readers never observe a half-written file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use shared::{process_debug, ProcessRole};

use crate::error::{RunnerError, RunnerResult};
use crate::traits::PidStore;
use crate::types::ServerProcessIdentity;

/// PID store persisting the process identity in a plain file
#[derive(Debug, Clone)]
pub struct FilePidStore {
    path: PathBuf,
}

impl FilePidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location in the system temp directory
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("runner.pid")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "runner.pid".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
    }

    fn parse(&self, contents: &str) -> RunnerResult<ServerProcessIdentity> {
        let invalid = || RunnerError::InvalidPidFile {
            path: self.path.clone(),
            contents: contents.to_string(),
        };

        let (master, manager) = contents.trim().split_once(',').ok_or_else(invalid)?;
        let master_pid: i32 = master.trim().parse().map_err(|_| invalid())?;
        let manager_pid: i32 = manager.trim().parse().map_err(|_| invalid())?;

        if master_pid < 0 || manager_pid < 0 {
            return Err(invalid());
        }

        Ok(ServerProcessIdentity::new(master_pid, manager_pid))
    }
}

impl Default for FilePidStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl PidStore for FilePidStore {
    fn write(&self, master_pid: i32, manager_pid: i32) -> RunnerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RunnerError::pid_file("create directory", parent, e))?;
        }

        let temp_path = self.temp_path();
        let result = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(format!("{master_pid},{manager_pid}").as_bytes())?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&temp_path, &self.path));

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(RunnerError::pid_file("write", &self.path, e));
        }

        process_debug!(
            ProcessRole::current(),
            "Wrote PID file {} (master {}, manager {})",
            self.path.display(),
            master_pid,
            manager_pid
        );
        Ok(())
    }

    fn read(&self) -> RunnerResult<Option<ServerProcessIdentity>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => self.parse(&contents).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RunnerError::pid_file("read", &self.path, e)),
        }
    }

    fn delete(&self) -> RunnerResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                process_debug!(ProcessRole::current(), "Removed PID file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RunnerError::pid_file("delete", &self.path, e)),
        }
    }
}
