//! Periodic maintenance task.
//!
//! # Responsibility
//! - Send anniversary and milestone reminders due today.
//! - Finalize unbind requests whose cooling-off period elapsed.
//! - Purge expired sessions.
//! - Run all passes on a fixed interval from one background thread.
//!
//! # Invariants
//! - `run_once` is idempotent; overlapping runs cannot double-process.
//! - A failed run is logged and retried at the next tick.

use crate::clock::MILLIS_PER_HOUR;
use crate::service::reminder::{ReminderError, ReminderReport, ReminderService};
use crate::service::session_service::{SessionService, SessionServiceError};
use crate::service::space_service::{FinalizeReport, SpaceService, SpaceServiceError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(MILLIS_PER_HOUR as u64);

#[derive(Debug)]
pub enum SweepError {
    Reminders(ReminderError),
    Finalize(SpaceServiceError),
    Sessions(SessionServiceError),
}

impl Display for SweepError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reminders(err) => write!(f, "reminder pass failed: {err}"),
            Self::Finalize(err) => write!(f, "unbind finalization failed: {err}"),
            Self::Sessions(err) => write!(f, "session purge failed: {err}"),
        }
    }
}

impl Error for SweepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reminders(err) => Some(err),
            Self::Finalize(err) => Some(err),
            Self::Sessions(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reminders: ReminderReport,
    pub unbind: FinalizeReport,
    pub sessions_purged: usize,
}

/// Scheduled entry point for lifecycle maintenance.
pub struct SweepTask {
    spaces: Arc<SpaceService>,
    reminders: Arc<ReminderService>,
    sessions: Arc<SessionService>,
}

impl SweepTask {
    pub fn new(
        spaces: Arc<SpaceService>,
        reminders: Arc<ReminderService>,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self {
            spaces,
            reminders,
            sessions,
        }
    }

    /// Finalizes before reminding, so a space dissolved this tick is not reminded.
    pub fn run_once(&self) -> Result<SweepReport, SweepError> {
        let unbind = self
            .spaces
            .finalize_expired_unbind_requests()
            .map_err(SweepError::Finalize)?;
        let reminders = self.reminders.run().map_err(SweepError::Reminders)?;
        let sessions_purged = self
            .sessions
            .purge_expired()
            .map_err(SweepError::Sessions)?;
        Ok(SweepReport {
            reminders,
            unbind,
            sessions_purged,
        })
    }

    /// Runs the sweep now and then every `interval` on a background thread.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> std::io::Result<SweepHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let join = std::thread::Builder::new()
            .name("duet-sweep".to_string())
            .spawn(move || {
                info!(
                    "event=sweep_start module=service status=start interval_secs={}",
                    interval.as_secs()
                );
                loop {
                    if let Err(err) = self.run_once() {
                        error!("event=sweep_run module=service status=error error={err}");
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("event=sweep_stop module=service status=ok");
            })?;

        Ok(SweepHandle {
            stop_tx,
            join: Some(join),
        })
    }
}

/// Stops the periodic sweep when `stop` is called or the handle is dropped.
pub struct SweepHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Signals the sweep thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Blocks until the sweep thread exits on its own.
    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("event=sweep_stop module=service status=error reason=thread_panicked");
            }
        }
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("event=sweep_stop module=service status=error reason=thread_panicked");
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
