//! Development server entry point
//!
//! Loads `RunnerConfig` (file, then `RUNNER_*` environment, then command line)
//! and runs the echo application behind the request-handler runner.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use devserver::{EchoHandler, LocalServer};
use runner::{RequestHandlerRunner, RunnerConfig};
use shared::{logging, process_info, ProcessRole};

#[derive(Parser, Debug)]
#[command(name = "devserver")]
#[command(about = "Single-process development server for the request-handler runner")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 picks a free port)
    #[arg(long)]
    port: Option<u16>,

    /// Where the master/manager PID record is written
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Static document root; repeat for several roots
    #[arg(long = "document-root")]
    document_roots: Vec<PathBuf>,

    /// Disable the static file short-circuit
    #[arg(long)]
    no_static: bool,

    /// Restart the worker when watched sources change
    #[arg(long)]
    hot_reload: bool,

    /// Prefix used for process titles
    #[arg(long)]
    process_name: Option<String>,
}

impl Args {
    fn apply(self, config: &mut RunnerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(pid_file) = self.pid_file {
            config.pid_file = pid_file;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if !self.document_roots.is_empty() {
            config.static_files.document_roots = self.document_roots;
        }
        if self.no_static {
            config.static_files.enable = false;
        }
        if self.hot_reload {
            config.hot_code_reload.enable = true;
        }
        if let Some(process_name) = self.process_name {
            config.process_name = process_name;
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = RunnerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    logging::init_tracing_with_level(Some(&config.log_level))?;
    process_info!(
        ProcessRole::current(),
        "Loaded configuration for {} on {}",
        config.process_name,
        config.bind_address()
    );

    let server = LocalServer::from_config(&config);
    let runner = RequestHandlerRunner::builder(server, Arc::new(EchoHandler::new()))
        .config(&config)?
        .build()?;

    runner.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        // Arrange
        let args = Args::parse_from([
            "devserver",
            "--port",
            "0",
            "--document-root",
            "public",
            "--document-root",
            "assets",
            "--no-static",
            "--hot-reload",
            "--process-name",
            "shop",
        ]);
        let mut config = RunnerConfig::default();

        // Act
        args.apply(&mut config);

        // Assert
        assert_eq!(config.port, 0);
        assert_eq!(
            config.static_files.document_roots,
            vec![PathBuf::from("public"), PathBuf::from("assets")]
        );
        assert!(!config.static_files.enable);
        assert!(config.hot_code_reload.enable);
        assert_eq!(config.process_name, "shop");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = Args::parse_from(["devserver"]);
        let mut config = RunnerConfig::default();
        config.port = 9000;

        args.apply(&mut config);

        assert_eq!(config.port, 9000);
        assert!(config.static_files.enable);
        assert!(!config.hot_code_reload.enable);
    }
}
