//! Process host for the Duet core.
//!
//! # Responsibility
//! - Load configuration and pick the store adapter once at start.
//! - Run the lifecycle sweep once or on its configured interval.

use clap::{Parser, Subcommand};
use duet_core::{
    core_version, init_logging, logging_status, open_store, AppConfig, Clock, ReminderService,
    SessionService, SpaceService, StoreConfig, StoreNotifier, SweepTask, SystemClock,
};
use duet_core::repo::SpaceRepository;
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "duet", version = env!("CARGO_PKG_VERSION"), about = "Duet space lifecycle host")]
struct Cli {
    /// Override DUET_DB_PATH (`:memory:` for an in-memory database).
    #[clap(long, global = true)]
    db_path: Option<PathBuf>,
    /// Use the in-process document store instead of SQLite.
    #[clap(long, global = true)]
    memory_doc: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Finalize expired unbind requests, send reminders and purge expired sessions.
    Sweep {
        /// Run a single pass and exit.
        #[clap(long)]
        once: bool,
        /// Override DUET_SWEEP_INTERVAL_SECS.
        #[clap(long)]
        interval_secs: Option<u64>,
    },
    /// Print core and store information.
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => fail(&message),
    }
}

fn fail(message: &str) -> ExitCode {
    // Config and logger failures happen before there is a log sink.
    if logging_status().is_some() {
        error!("event=cli_exit module=cli status=error error={message}");
    }
    eprintln!("duet: {message}");
    ExitCode::FAILURE
}

fn run(cli: Cli) -> Result<(), String> {
    let mut config = AppConfig::from_env().map_err(|err| err.to_string())?;
    if cli.memory_doc {
        config.store = StoreConfig::MemoryDocument;
    } else if let Some(path) = cli.db_path {
        config.store = StoreConfig::Sqlite {
            path: (path.as_os_str() != ":memory:").then_some(path),
        };
    }
    init_logging(&config.log_level, &config.log_dir).map_err(|err| err.to_string())?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config.store, clock.clone()).map_err(|err| err.to_string())?;

    match cli.command {
        Command::Status => {
            let spaces = store.list_spaces().map_err(|err| err.to_string())?;
            println!("duet_core version={}", core_version());
            println!("store backend={}", store.backend_name());
            println!("active spaces={}", spaces.len());
            Ok(())
        }
        Command::Sweep {
            once,
            interval_secs,
        } => {
            let notifier = Arc::new(StoreNotifier::new(store.clone()));
            let spaces = Arc::new(SpaceService::new(
                store.clone(),
                notifier.clone(),
                clock.clone(),
            ));
            let reminders = Arc::new(ReminderService::new(store.clone(), notifier, clock.clone()));
            let sessions = Arc::new(SessionService::new(store, clock));
            let task = Arc::new(SweepTask::new(spaces, reminders, sessions));

            if once {
                let report = task.run_once().map_err(|err| err.to_string())?;
                println!(
                    "unbind completed={} skipped={} failed={} sessions_purged={}",
                    report.unbind.completed,
                    report.unbind.skipped,
                    report.unbind.failed,
                    report.sessions_purged
                );
                println!(
                    "reminders anniversary={} milestone={} failed_spaces={}",
                    report.reminders.anniversary,
                    report.reminders.milestone,
                    report.reminders.failed_spaces
                );
                return Ok(());
            }

            let interval = interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(config.sweep_interval);
            let handle = task
                .spawn_periodic(interval)
                .map_err(|err| format!("failed to start sweep thread: {err}"))?;
            handle.join();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{fail, Cli, Command};
    use clap::Parser;
    use duet_core::logging_status;
    use std::process::ExitCode;

    #[test]
    fn failure_before_logger_init_only_reports_to_stderr() {
        assert!(logging_status().is_none());
        assert_eq!(fail("config invalid"), ExitCode::FAILURE);
        assert!(logging_status().is_none());
    }

    #[test]
    fn sweep_once_parses_with_global_store_flags() {
        let cli = Cli::try_parse_from(["duet", "--memory-doc", "sweep", "--once"]).unwrap();
        assert!(cli.memory_doc);
        assert!(matches!(
            cli.command,
            Command::Sweep {
                once: true,
                interval_secs: None
            }
        ));
    }
}
