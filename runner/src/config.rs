//! Runner configuration
//!
//! Values come from three layers, each overriding the previous one: a JSON
//! file, `RUNNER_*` environment variables and command-line flags (applied by
//! the binaries directly on the struct).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RunnerError, RunnerResult};
use crate::services::{AccessLogFormatter, FilePidStore, FileSystemStaticHandler, TracingAccessLogger};
use crate::types::ProcessNamingPolicy;

pub const ENV_PREFIX: &str = "RUNNER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Prefix of every OS-visible process name
    pub process_name: String,
    pub host: String,
    pub port: u16,
    /// Request-serving worker pool size
    pub worker_num: u32,
    pub task_worker_num: u32,
    pub max_conn: usize,
    pub pid_file: PathBuf,
    pub log_level: String,
    /// Named format or literal template
    pub access_log_format: String,
    pub static_files: StaticFilesConfig,
    pub hot_code_reload: HotReloadConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            process_name: "runner".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            worker_num: 1,
            task_worker_num: 0,
            max_conn: 1024,
            pid_file: FilePidStore::default_path(),
            log_level: "info".to_string(),
            access_log_format: "common".to_string(),
            static_files: StaticFilesConfig::default(),
            hot_code_reload: HotReloadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    pub enable: bool,
    pub document_roots: Vec<PathBuf>,
    /// Extension to Cache-Control value, merged over the built-in rules
    pub cache_control: HashMap<String, String>,
    /// Extension to MIME type, merged over the built-in map
    pub type_map: HashMap<String, String>,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enable: true,
            document_roots: vec![PathBuf::from("public")],
            cache_control: HashMap::new(),
            type_map: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    pub enable: bool,
    pub interval_ms: u64,
    pub paths: Vec<PathBuf>,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enable: false,
            interval_ms: 500,
            paths: vec![PathBuf::from("src")],
        }
    }
}

impl RunnerConfig {
    /// Load a JSON config file; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> RunnerResult<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: RunnerConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Defaults, then the file if given, then the process environment
    pub fn load(path: Option<&Path>) -> RunnerResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `RUNNER_*` environment variables
    pub fn apply_env(&mut self) -> RunnerResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> RunnerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("PROCESS_NAME") {
            self.process_name = value;
        }
        if let Some(value) = var("HOST") {
            self.host = value;
        }
        if let Some(value) = var("PORT") {
            self.port = parse_env("PORT", &value)?;
        }
        if let Some(value) = var("WORKER_NUM") {
            self.worker_num = parse_env("WORKER_NUM", &value)?;
        }
        if let Some(value) = var("TASK_WORKER_NUM") {
            self.task_worker_num = parse_env("TASK_WORKER_NUM", &value)?;
        }
        if let Some(value) = var("MAX_CONN") {
            self.max_conn = parse_env("MAX_CONN", &value)?;
        }
        if let Some(value) = var("PID_FILE") {
            self.pid_file = PathBuf::from(value);
        }
        if let Some(value) = var("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = var("ACCESS_LOG_FORMAT") {
            self.access_log_format = value;
        }
        if let Some(value) = var("STATIC_FILES_ENABLE") {
            self.static_files.enable = parse_env("STATIC_FILES_ENABLE", &value)?;
        }
        if let Some(value) = var("DOCUMENT_ROOTS") {
            self.static_files.document_roots = split_list(&value);
        }
        if let Some(value) = var("HOT_CODE_RELOAD_ENABLE") {
            self.hot_code_reload.enable = parse_env("HOT_CODE_RELOAD_ENABLE", &value)?;
        }
        if let Some(value) = var("HOT_CODE_RELOAD_INTERVAL_MS") {
            self.hot_code_reload.interval_ms = parse_env("HOT_CODE_RELOAD_INTERVAL_MS", &value)?;
        }
        if let Some(value) = var("HOT_CODE_RELOAD_PATHS") {
            self.hot_code_reload.paths = split_list(&value);
        }

        Ok(())
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.process_name.trim().is_empty() {
            return Err(RunnerError::config("process_name must not be empty"));
        }
        if self.worker_num == 0 {
            return Err(RunnerError::config("worker_num must be at least 1"));
        }
        if self.max_conn == 0 {
            return Err(RunnerError::config("max_conn must be at least 1"));
        }
        if self.hot_code_reload.enable && self.hot_code_reload.interval_ms == 0 {
            return Err(RunnerError::config("hot_code_reload.interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn naming_policy(&self) -> ProcessNamingPolicy {
        ProcessNamingPolicy::new(self.process_name.clone())
    }

    pub fn pid_store(&self) -> FilePidStore {
        FilePidStore::new(self.pid_file.clone())
    }

    pub fn access_logger(&self) -> TracingAccessLogger {
        TracingAccessLogger::new(AccessLogFormatter::from_name(&self.access_log_format))
    }

    /// `None` when static serving is disabled
    pub fn static_handler(&self) -> Option<FileSystemStaticHandler> {
        if !self.static_files.enable {
            return None;
        }

        let mut handler = FileSystemStaticHandler::with_document_roots(self.static_files.document_roots.clone());
        for (extension, mime) in &self.static_files.type_map {
            handler = handler.with_mime_type(extension, mime);
        }
        for (extension, value) in &self.static_files.cache_control {
            handler = handler.with_cache_control(extension, value);
        }
        Some(handler)
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_code_reload.interval_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> RunnerResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RunnerError::config(format!("{ENV_PREFIX}{name}={value:?} is not valid")))
}

fn split_list(value: &str) -> Vec<PathBuf> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();

        assert_eq!(config.process_name, "runner");
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.worker_num, 1);
        assert_eq!(config.max_conn, 1024);
        assert!(config.static_files.enable);
        assert!(!config.hot_code_reload.enable);
        assert_eq!(config.reload_interval(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_fills_missing_keys_with_defaults() {
        // Arrange
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"process_name": "shop", "port": 9000, "static_files": {{"enable": false}}}}"#
        )
        .unwrap();

        // Act
        let config = RunnerConfig::from_file(file.path()).unwrap();

        // Assert
        assert_eq!(config.process_name, "shop");
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert!(!config.static_files.enable);
        assert_eq!(config.static_files.document_roots, vec![PathBuf::from("public")]);
        assert!(config.static_handler().is_none());
    }

    #[test]
    fn test_from_file_rejects_malformed_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let result = RunnerConfig::from_file(file.path());

        assert!(matches!(result, Err(RunnerError::JsonError(_))));
    }

    #[test]
    fn test_env_overrides() {
        // Arrange
        let mut config = RunnerConfig::default();
        let env = lookup(&[
            ("RUNNER_PORT", "9090"),
            ("RUNNER_WORKER_NUM", "4"),
            ("RUNNER_DOCUMENT_ROOTS", "public, assets ,"),
            ("RUNNER_HOT_CODE_RELOAD_ENABLE", "true"),
            ("UNRELATED", "x"),
        ]);

        // Act
        config.apply_env_from(env).unwrap();

        // Assert
        assert_eq!(config.port, 9090);
        assert_eq!(config.worker_num, 4);
        assert_eq!(
            config.static_files.document_roots,
            vec![PathBuf::from("public"), PathBuf::from("assets")]
        );
        assert!(config.hot_code_reload.enable);
    }

    #[test]
    fn test_env_invalid_number_is_config_error() {
        let mut config = RunnerConfig::default();

        let result = config.apply_env_from(lookup(&[("RUNNER_PORT", "eighty")]));

        match result {
            Err(RunnerError::ConfigurationError { field }) => assert!(field.contains("RUNNER_PORT")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_worker_pool() {
        let config = RunnerConfig {
            worker_num: 0,
            ..RunnerConfig::default()
        };

        assert!(matches!(config.validate(), Err(RunnerError::ConfigurationError { .. })));
    }

    #[test]
    fn test_derived_collaborators() {
        let config = RunnerConfig {
            process_name: "api".to_string(),
            access_log_format: "combined".to_string(),
            ..RunnerConfig::default()
        };

        assert_eq!(config.naming_policy().master(), "api-master");
        assert_eq!(
            config.access_logger().formatter().format_string(),
            crate::services::access_log::FORMAT_COMBINED
        );
        assert_eq!(config.pid_store().path(), config.pid_file.as_path());
    }
}
