//! SQLite storage.
//!
//! One row per token in `sf_profiler_data`. Indexed fields get their own
//! columns for querying; the full record and its index entry are kept as
//! JSON text. Rows older than the configured lifetime are removed on write.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};

use crate::encoding::{EncodedRecord, EncoderRegistry, IndexEntry, ProfileEncoder};
use crate::errors::{ProfilerError, Result};
use crate::logging::LogContext;

use super::criteria::{is_exact_field, Criteria};
use super::RecordStore;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sf_profiler_data (
    token TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    parent_token TEXT,
    time INTEGER NOT NULL,
    ip TEXT,
    url TEXT,
    method TEXT,
    status_code INTEGER,
    command TEXT,
    exit_code INTEGER,
    indexed TEXT NOT NULL,
    record TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_profiler_time ON sf_profiler_data(time);
CREATE INDEX IF NOT EXISTS idx_profiler_parent ON sf_profiler_data(parent_token);
CREATE INDEX IF NOT EXISTS idx_profiler_created ON sf_profiler_data(created_at);
";

const UPSERT_SQL: &str = "
INSERT INTO sf_profiler_data
    (token, kind, parent_token, time, ip, url, method, status_code, command, exit_code,
     indexed, record, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
ON CONFLICT(token) DO UPDATE SET
    kind = excluded.kind,
    parent_token = excluded.parent_token,
    time = excluded.time,
    ip = excluded.ip,
    url = excluded.url,
    method = excluded.method,
    status_code = excluded.status_code,
    command = excluded.command,
    exit_code = excluded.exit_code,
    indexed = excluded.indexed,
    record = excluded.record,
    created_at = excluded.created_at
";

/// Columns a criterion may target.
const QUERY_COLUMNS: &[&str] = &[
    "token",
    "parent_token",
    "time",
    "ip",
    "url",
    "method",
    "status_code",
    "command",
    "exit_code",
];

pub struct SqliteProfilerStorage {
    conn: Mutex<Connection>,
    encoders: EncoderRegistry,
    /// Seconds a row is kept; 0 keeps rows forever.
    lifetime: u64,
}

impl SqliteProfilerStorage {
    /// Open from a `sqlite:<path>` or `sqlite::memory:` DSN.
    pub fn new(dsn: &str, lifetime: u64) -> Result<Self> {
        match dsn.strip_prefix("sqlite:") {
            Some(":memory:") => Self::in_memory(lifetime),
            Some(path) if !path.is_empty() => Self::open(path, lifetime),
            _ => Err(ProfilerError::InvalidDsn {
                backend: "sqlite",
                dsn: dsn.to_string(),
                expected: "sqlite:/path/to/profiler.db",
            }),
        }
    }

    pub fn open(path: impl AsRef<Path>, lifetime: u64) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        crate::log_info!(
            LogContext::new("sqlite"),
            "SQLITE_STORAGE_OPENED",
            path = path.as_ref().display()
        );
        Self::with_connection(conn, lifetime)
    }

    pub fn in_memory(lifetime: u64) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, lifetime)
    }

    fn with_connection(conn: Connection, lifetime: u64) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
            encoders: EncoderRegistry::default(),
            lifetime,
        })
    }

    pub fn add_encoder(&mut self, encoder: Arc<dyn ProfileEncoder>) {
        self.encoders.add(encoder);
    }

    /// Delete rows written more than `lifetime` seconds ago.
    pub fn purge_expired(&self) -> Result<usize> {
        if self.lifetime == 0 {
            return Ok(0);
        }
        let lifetime = i64::try_from(self.lifetime).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp().saturating_sub(lifetime);
        let removed = self.conn.lock().execute(
            "DELETE FROM sf_profiler_data WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}

impl RecordStore for SqliteProfilerStorage {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    fn do_write(&self, record: &EncodedRecord, indexed: &IndexEntry) -> Result<bool> {
        let record_json = serde_json::to_string(&record.to_flat()?)?;
        let indexed_json = serde_json::to_string(indexed)?;

        let changed = self.conn.lock().execute(
            UPSERT_SQL,
            params![
                record.token,
                record.kind,
                record.parent_token,
                record.time,
                indexed.get_str("ip"),
                indexed.get_str("url"),
                indexed.get_str("method"),
                indexed.get_i64("status_code"),
                indexed.get_str("command"),
                indexed.get_i64("exit_code"),
                indexed_json,
                record_json,
                Utc::now().timestamp(),
            ],
        )?;

        let expired = self.purge_expired()?;
        if expired > 0 {
            crate::log_debug!(LogContext::new("sqlite"), "EXPIRED_ROWS_REMOVED", count = expired);
        }

        Ok(changed > 0)
    }

    fn do_read(&self, token: &str) -> Result<Option<EncodedRecord>> {
        let row: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT record FROM sf_profiler_data WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;

        match row {
            Some(json) => {
                let flat = serde_json::from_str(&json)
                    .map_err(|e| ProfilerError::Decode(format!("row {}: {}", token, e)))?;
                EncodedRecord::from_flat(flat).map(Some)
            }
            None => Ok(None),
        }
    }

    fn do_find(
        &self,
        criteria: &Criteria,
        limit: usize,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<IndexEntry>> {
        let mut sql = String::from("SELECT indexed FROM sf_profiler_data WHERE 1 = 1");
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        for (field, value) in criteria.iter() {
            if !QUERY_COLUMNS.contains(&field) {
                return Ok(Vec::new());
            }
            if is_exact_field(field) {
                let Ok(number) = value.parse::<i64>() else {
                    return Ok(Vec::new());
                };
                sql.push_str(&format!(" AND {} = ?", field));
                values.push(Box::new(number));
            } else {
                // instr is literal and case-sensitive, unlike LIKE.
                sql.push_str(&format!(" AND instr({}, ?) > 0", field));
                values.push(Box::new(value.to_string()));
            }
        }
        if let Some(start) = start {
            sql.push_str(" AND time >= ?");
            values.push(Box::new(start));
        }
        if let Some(end) = end {
            sql.push_str(" AND time <= ?");
            values.push(Box::new(end));
        }
        sql.push_str(" ORDER BY time DESC, rowid DESC LIMIT ?");
        values.push(Box::new(limit as i64));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter().map(|v| v.as_ref())), |row| {
            row.get::<_, String>(0)
        })?;

        let mut result = Vec::new();
        for row in rows {
            let entry = serde_json::from_str(&row?)
                .map_err(|e| ProfilerError::Decode(format!("index entry: {}", e)))?;
            result.push(entry);
        }
        Ok(result)
    }

    fn do_purge(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM sf_profiler_data", [])?;
        Ok(())
    }
}
