//! Process configuration and store selection.
//!
//! # Responsibility
//! - Read `DUET_*` environment variables once at process start.
//! - Construct the configured store adapter as `Arc<dyn Store>`.
//!
//! # Invariants
//! - Adapter choice is configuration passed to constructors, never global
//!   state.
//! - Unset or blank variables fall back to documented defaults.

use crate::clock::Clock;
use crate::logging::default_log_level;
use crate::repo::document_backend::MemoryDocumentBackend;
use crate::repo::document_repo::DocumentStore;
use crate::repo::sqlite_repo::SqliteStore;
use crate::repo::{RepoResult, Store};
use crate::service::sweep::DEFAULT_SWEEP_INTERVAL;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_STORE: &str = "DUET_STORE";
pub const ENV_DB_PATH: &str = "DUET_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "DUET_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "DUET_LOG_DIR";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "DUET_SWEEP_INTERVAL_SECS";

pub const DEFAULT_DB_PATH: &str = "duet.sqlite3";
const IN_MEMORY_DB_PATH: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownStore(String),
    InvalidSweepInterval(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStore(value) => write!(
                f,
                "unsupported {ENV_STORE} `{value}`; expected sqlite|memory-doc"
            ),
            Self::InvalidSweepInterval(value) => write!(
                f,
                "{ENV_SWEEP_INTERVAL_SECS} must be a positive integer, got `{value}`"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Which adapter backs the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// SQLite file at `path`, or a private in-memory database.
    Sqlite { path: Option<PathBuf> },
    /// Document store over the in-process backend.
    MemoryDocument,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: Some(PathBuf::from(DEFAULT_DB_PATH)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = read(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let store = match read(ENV_STORE).as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("sqlite") => StoreConfig::Sqlite {
                path: (db_path != IN_MEMORY_DB_PATH).then(|| PathBuf::from(&db_path)),
            },
            Some("memory-doc") => StoreConfig::MemoryDocument,
            Some(other) => return Err(ConfigError::UnknownStore(other.to_string())),
        };

        let sweep_interval = match read(ENV_SWEEP_INTERVAL_SECS) {
            None => DEFAULT_SWEEP_INTERVAL,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidSweepInterval(raw)),
            },
        };

        Ok(Self {
            store,
            log_level: read(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string()),
            log_dir: read(ENV_LOG_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("duet").join("logs")),
            sweep_interval,
        })
    }
}

/// Constructs the configured adapter.
pub fn open_store(config: &StoreConfig, clock: Arc<dyn Clock>) -> RepoResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config {
        StoreConfig::Sqlite { path: Some(path) } => Arc::new(SqliteStore::open(path, clock)?),
        StoreConfig::Sqlite { path: None } => Arc::new(SqliteStore::open_in_memory(clock)?),
        StoreConfig::MemoryDocument => {
            Arc::new(DocumentStore::new(MemoryDocumentBackend::new(), clock))
        }
    };
    info!(
        "event=store_open module=config status=ok backend={}",
        store.backend_name()
    );
    Ok(store)
}
