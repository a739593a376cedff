//! Profile storage.
//!
//! Every backend implements [`RecordStore`], a flat key/record store with an
//! index. The tree logic (recursive child writes, cycle-safe reads, lazy
//! parent resolution) is shared through the blanket [`ProfilerStorage`] impl.
//!
//! Backends:
//! - file: one JSON file per token plus a newline-delimited index
//! - sqlite: one row per token in `sf_profiler_data`
//! - cache: key/value items behind a [`CacheClient`]
//! - document: one document per token behind a [`DocumentCollection`]

pub mod cache;
pub mod criteria;
pub mod document;
pub mod dsn;
pub mod file;
pub mod index_log;
pub mod sqlite;


pub use cache::*;
pub use criteria::*;
pub use document::*;
pub use dsn::*;
pub use file::*;
pub use sqlite::*;

use std::collections::HashSet;

use crate::encoding::{EncodedRecord, EncoderRegistry, IndexEntry};
use crate::errors::{ProfilerError, Result};
use crate::logging::LogContext;
use crate::profile::Profile;

/// Persistence contract used by the profiler.
pub trait ProfilerStorage: Send + Sync {
    /// Persist a profile and, recursively, its children.
    ///
    /// Returns `false` when the backend refused the top-level record.
    /// Child failures are logged and do not stop sibling writes.
    fn write(&self, profile: &Profile) -> Result<bool>;

    /// Load a profile with its children and, at the top level, its parent.
    fn read(&self, token: &str) -> Result<Option<Profile>>;

    /// Index entries matching `criteria` within the inclusive time window,
    /// newest first, at most `limit` of them.
    fn find_by(
        &self,
        criteria: &Criteria,
        limit: usize,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<IndexEntry>>;

    /// Remove every stored profile.
    fn purge(&self) -> Result<()>;
}

/// Flat record store implemented by each backend.
pub trait RecordStore: Send + Sync {
    /// Short backend name used in log lines.
    fn backend(&self) -> &'static str;

    fn encoders(&self) -> &EncoderRegistry;

    /// Upsert one record together with its index entry.
    fn do_write(&self, record: &EncodedRecord, indexed: &IndexEntry) -> Result<bool>;

    fn do_read(&self, token: &str) -> Result<Option<EncodedRecord>>;

    /// Search the index. Called with `limit > 0` only.
    fn do_find(
        &self,
        criteria: &Criteria,
        limit: usize,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<IndexEntry>>;

    fn do_purge(&self) -> Result<()>;
}

impl<S: RecordStore> ProfilerStorage for S {
    fn write(&self, profile: &Profile) -> Result<bool> {
        let ctx = LogContext::new(self.backend()).with_token(profile.token());

        let encoder = self.encoders().resolve(profile.kind().discriminator())?;
        let record = encoder.encode(profile)?;
        let indexed = record.indexed(&encoder.indexes())?;
        let written = self.do_write(&record, &indexed)?;
        crate::log_debug!(ctx, "PROFILE_WRITTEN", written = written);

        for child in profile.children() {
            match self.write(child) {
                Ok(true) => {}
                Ok(false) => {
                    crate::log_warn!(ctx, "CHILD_WRITE_FAILED", child = child.token());
                }
                Err(e) => {
                    crate::log_warn!(
                        ctx,
                        "CHILD_WRITE_FAILED",
                        child = child.token(),
                        error = e
                    );
                }
            }
        }

        Ok(written)
    }

    fn read(&self, token: &str) -> Result<Option<Profile>> {
        if token.is_empty() {
            return Ok(None);
        }
        read_with_ancestors(self, token, &mut HashSet::new())
    }

    fn find_by(
        &self,
        criteria: &Criteria,
        limit: usize,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<IndexEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.do_find(criteria, limit, start, end)
    }

    fn purge(&self) -> Result<()> {
        self.do_purge()?;
        crate::log_info!(LogContext::new(self.backend()), "STORAGE_PURGED");
        Ok(())
    }
}

/// Read `token` with its subtree, then attach its parent chain.
///
/// `ancestors` holds tokens whose parent is being resolved so a corrupt
/// parent cycle terminates.
fn read_with_ancestors<S: RecordStore + ?Sized>(
    store: &S,
    token: &str,
    ancestors: &mut HashSet<String>,
) -> Result<Option<Profile>> {
    ancestors.insert(token.to_string());

    let mut profile = match read_subtree(store, token, &mut HashSet::new())? {
        Some(profile) => profile,
        None => return Ok(None),
    };

    if let Some(parent_token) = profile.parent_token().map(str::to_string) {
        if ancestors.contains(&parent_token) {
            crate::log_warn!(
                LogContext::new(store.backend()).with_token(token),
                "PARENT_CYCLE",
                parent = parent_token
            );
        } else if let Some(parent) = read_with_ancestors(store, &parent_token, ancestors)? {
            profile.set_parent(parent);
        }
    }

    Ok(Some(profile))
}

/// Decode `token` and its descendants without touching the parent.
///
/// `resolving` holds the tokens on the current descent path.
fn read_subtree<S: RecordStore + ?Sized>(
    store: &S,
    token: &str,
    resolving: &mut HashSet<String>,
) -> Result<Option<Profile>> {
    let ctx = LogContext::new(store.backend()).with_token(token);

    if !resolving.insert(token.to_string()) {
        crate::log_warn!(ctx, "CHILD_CYCLE");
        return Ok(None);
    }

    let record = match store.do_read(token)? {
        Some(record) => record,
        None => {
            resolving.remove(token);
            return Ok(None);
        }
    };

    let encoder = store.encoders().resolve(&record.kind)?;
    let mut profile = encoder.decode(&record)?;

    for child_token in &record.children {
        match read_subtree(store, child_token, resolving)? {
            Some(child) => profile.add_child(child),
            None => crate::log_debug!(ctx, "CHILD_MISSING", child = child_token),
        }
    }

    resolving.remove(token);
    Ok(Some(profile))
}

/// Validate a token before it becomes part of a key or path.
pub(crate) fn check_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(ProfilerError::EmptyToken);
    }
    Ok(())
}
