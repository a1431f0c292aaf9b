//! Operator tool for a running server
//!
//! Reads the PID record the runner writes on start and signals the master:
//! `status` checks liveness, `stop` terminates (escalating to SIGKILL after
//! the timeout) and `reload` restarts the workers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use runner::{FilePidStore, RunnerConfig, ServerControl, ServerStatus, StopOutcome};
use shared::{logging, process_debug, process_info, process_warn, ProcessRole};

#[derive(Parser, Debug)]
#[command(name = "runnerctl")]
#[command(about = "Inspect, stop or reload a server started by the request-handler runner")]
struct Args {
    /// PID record to read (overrides the configuration)
    #[arg(long, global = true)]
    pid_file: Option<PathBuf>,

    /// JSON configuration file the server was started with
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Report whether the server is running
    Status,
    /// Stop the server gracefully
    Stop {
        /// Seconds to wait before sending SIGKILL
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
    /// Restart the worker processes
    Reload,
}

impl Args {
    fn pid_file(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.pid_file {
            return Ok(path.clone());
        }
        let config = RunnerConfig::load(self.config.as_deref())?;
        Ok(config.pid_file)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logging::init_tracing_with_level(Some(&args.log_level))?;

    let pid_file = args.pid_file()?;
    process_debug!(ProcessRole::current(), "Using PID record {}", pid_file.display());
    let control = ServerControl::new(Arc::new(FilePidStore::new(&pid_file)));

    match args.command {
        Command::Status => match control.status()? {
            ServerStatus::Running(identity) => println!("running ({identity})"),
            ServerStatus::Stopped => {
                println!("stopped");
                std::process::exit(3);
            }
        },
        Command::Stop { timeout } => {
            process_info!(ProcessRole::current(), "Stopping server (timeout {}s)", timeout);
            match control.stop(Duration::from_secs(timeout)).await? {
                StopOutcome::NotRunning => println!("not running"),
                StopOutcome::Terminated => println!("stopped"),
                StopOutcome::Killed => {
                    process_warn!(
                        ProcessRole::current(),
                        "Server ignored SIGTERM for {}s and was killed",
                        timeout
                    );
                    println!("killed after {timeout}s");
                }
            }
        }
        Command::Reload => {
            let identity = control.reload()?;
            process_info!(ProcessRole::current(), "Sent reload signal to master {}", identity.master_pid);
            println!("reload requested ({identity})");
        }
    }

    Ok(())
}
