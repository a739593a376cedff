//! Storage configuration.
//!
//! A DSN selects the backend; `lifetime_secs` bounds retention for the
//! backends that expire records. Network backends need a client and are
//! built directly (`CacheProfilerStorage::new`, `DocumentProfilerStorage::new`).

use std::env;

use crate::errors::{ProfilerError, Result};
use crate::logging::LogContext;
use crate::storage::{
    CacheProfilerStorage, FileProfilerStorage, ProfilerStorage, SqliteProfilerStorage,
};

/// Default retention: one day.
pub const DEFAULT_LIFETIME_SECS: u64 = 86_400;

pub const DSN_ENV: &str = "PROFILER_DSN";
pub const LIFETIME_ENV: &str = "PROFILER_LIFETIME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub dsn: String,
    pub lifetime_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl StorageConfig {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            lifetime_secs: DEFAULT_LIFETIME_SECS,
            username: None,
            password: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime_secs: u64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Read `PROFILER_DSN` and `PROFILER_LIFETIME`.
    ///
    /// Returns `None` when no DSN is set. An unparseable lifetime falls back
    /// to the default.
    pub fn from_env() -> Option<Self> {
        let dsn = env::var(DSN_ENV).ok().filter(|dsn| !dsn.is_empty())?;
        let lifetime = env::var(LIFETIME_ENV).ok();
        Some(Self::new(&dsn).with_lifetime(parse_lifetime(lifetime.as_deref())))
    }
}

fn parse_lifetime(raw: Option<&str>) -> u64 {
    match raw {
        None => DEFAULT_LIFETIME_SECS,
        Some(raw) => match raw.trim().parse() {
            Ok(lifetime) => lifetime,
            Err(_) => {
                crate::log_warn!(
                    LogContext::new("config"),
                    "INVALID_LIFETIME",
                    value = raw,
                    fallback = DEFAULT_LIFETIME_SECS
                );
                DEFAULT_LIFETIME_SECS
            }
        },
    }
}

/// Build the storage a local DSN names.
pub fn open_storage(config: &StorageConfig) -> Result<Box<dyn ProfilerStorage>> {
    let dsn = config.dsn.as_str();

    let storage: Box<dyn ProfilerStorage> = if dsn.starts_with("file:") {
        Box::new(FileProfilerStorage::new(dsn)?)
    } else if dsn.starts_with("sqlite:") {
        Box::new(SqliteProfilerStorage::new(dsn, config.lifetime_secs)?)
    } else if dsn == "memory:" {
        Box::new(CacheProfilerStorage::in_memory(config.lifetime_secs)?)
    } else {
        return Err(ProfilerError::InvalidDsn {
            backend: "profiler",
            dsn: dsn.to_string(),
            expected: "file:<dir>, sqlite:<path> or memory:",
        });
    };

    crate::log_info!(
        LogContext::new("config"),
        "STORAGE_OPENED",
        scheme = dsn.split(':').next().unwrap_or_default(),
        lifetime = config.lifetime_secs
    );
    Ok(storage)
}
