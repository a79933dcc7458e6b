//! Core domain logic for Duet shared spaces.
//! This crate is the single source of truth for space lifecycle invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{open_store, AppConfig, ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::space::{PetNames, SpaceView};
pub use model::unbind::{UnbindRequest, UnbindStatus};
pub use repo::document_backend::{DocumentBackend, MemoryDocumentBackend};
pub use repo::document_repo::DocumentStore;
pub use repo::sqlite_repo::SqliteStore;
pub use repo::{DestroyedSpace, RepoError, RepoResult, Store, UnbindDisposition};
pub use service::notify::{notify_partners, Notice, Notifier, StoreNotifier};
pub use service::reminder::{ReminderError, ReminderReport, ReminderService};
pub use service::session_service::{ResolvedSession, SessionService, SessionServiceError};
pub use service::space_service::{
    FinalizeReport, InviteCodeSource, SpaceService, SpaceServiceError,
};
pub use service::sweep::{SweepHandle, SweepReport, SweepTask};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
