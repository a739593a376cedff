//! Filesystem storage.
//!
//! Records live at `<folder>/<last 2 token chars>/<previous 2>/<token>` as
//! JSON; `<folder>/index.jsonl` holds one index entry per line.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::encoding::{EncodedRecord, EncoderRegistry, IndexEntry, ProfileEncoder};
use crate::errors::{ProfilerError, Result};
use crate::logging::LogContext;

use super::criteria::Criteria;
use super::{check_token, index_log, RecordStore};

const INDEX_FILE: &str = "index.jsonl";

pub struct FileProfilerStorage {
    folder: PathBuf,
    encoders: EncoderRegistry,
    /// Serializes index rewrites within this process.
    lock: Mutex<()>,
}

impl FileProfilerStorage {
    /// Open from a `file:<folder>` DSN.
    pub fn new(dsn: &str) -> Result<Self> {
        match dsn.strip_prefix("file:") {
            Some(folder) if !folder.is_empty() => Self::open(folder),
            _ => Err(ProfilerError::InvalidDsn {
                backend: "file",
                dsn: dsn.to_string(),
                expected: "file:/path/to/folder",
            }),
        }
    }

    /// Open a folder, creating it when missing.
    pub fn open(folder: impl AsRef<Path>) -> Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        fs::create_dir_all(&folder)?;
        crate::log_info!(
            LogContext::new("file"),
            "FILE_STORAGE_OPENED",
            folder = folder.display()
        );

        Ok(Self {
            folder,
            encoders: EncoderRegistry::default(),
            lock: Mutex::new(()),
        })
    }

    pub fn add_encoder(&mut self, encoder: Arc<dyn ProfileEncoder>) {
        self.encoders.add(encoder);
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn index_path(&self) -> PathBuf {
        self.folder.join(INDEX_FILE)
    }

    /// Path of the record file for `token`.
    fn record_path(&self, token: &str) -> Result<PathBuf> {
        check_token(token)?;
        let unsafe_token = || {
            ProfilerError::Storage(format!("token \"{}\" is not a valid file name", token))
        };
        if !token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(unsafe_token());
        }

        let chars: Vec<char> = token.chars().collect();
        let n = chars.len();
        let last: String = chars[n.saturating_sub(2)..].iter().collect();
        let prev: String = chars[n.saturating_sub(4)..n.saturating_sub(2)].iter().collect();

        let mut path = self.folder.join(last);
        if !prev.is_empty() {
            path.push(prev);
        }
        path.push(token);
        if !path.starts_with(&self.folder) {
            return Err(unsafe_token());
        }
        Ok(path)
    }

    fn read_index(&self) -> Result<String> {
        match fs::read_to_string(self.index_path()) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl RecordStore for FileProfilerStorage {
    fn backend(&self) -> &'static str {
        "file"
    }

    fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    fn do_write(&self, record: &EncodedRecord, indexed: &IndexEntry) -> Result<bool> {
        let path = self.record_path(&record.token)?;
        let _guard = self.lock.lock();

        let existed = path.exists();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_vec(&record.to_flat()?)?)?;

        if existed {
            let index = index_log::upsert(&self.read_index()?, indexed)?;
            fs::write(self.index_path(), index)?;
        } else {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.index_path())?;
            file.write_all(index_log::line(indexed)?.as_bytes())?;
        }

        Ok(true)
    }

    fn do_read(&self, token: &str) -> Result<Option<EncodedRecord>> {
        let path = match self.record_path(token) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let flat = serde_json::from_slice(&bytes)
            .map_err(|e| ProfilerError::Decode(format!("{}: {}", path.display(), e)))?;
        EncodedRecord::from_flat(flat).map(Some)
    }

    fn do_find(
        &self,
        criteria: &Criteria,
        limit: usize,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<IndexEntry>> {
        let index = self.read_index()?;
        Ok(index_log::search(&index, criteria, limit, start, end))
    }

    fn do_purge(&self) -> Result<()> {
        let _guard = self.lock.lock();

        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
