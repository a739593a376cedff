//! Key/value cache storage.
//!
//! Items are stored under `sf_profiler_<token>` and listed in a
//! newline-delimited index under `sf_profiler_index`. Both expire after the
//! configured lifetime. The network client is injected through
//! [`CacheClient`]; [`MemoryCache`] is the in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::encoding::{EncodedRecord, EncoderRegistry, IndexEntry, ProfileEncoder};
use crate::errors::{ProfilerError, Result};
use crate::logging::LogContext;

use super::criteria::Criteria;
use super::dsn::CacheDsn;
use super::{check_token, index_log, RecordStore};

pub const KEY_PREFIX: &str = "sf_profiler_";
pub const INDEX_KEY: &str = "sf_profiler_index";

/// Minimal key/value client contract.
///
/// A `ttl_secs` of 0 means the item never expires.
pub trait CacheClient: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    /// Append to an existing value, creating it when missing.
    fn append(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    fn delete(&self, key: &str) -> Result<bool>;

    /// Longest key the server accepts, in bytes.
    fn max_key_length(&self) -> usize;
}

struct CacheItem {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheItem {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-process cache honoring TTLs.
pub struct MemoryCache {
    items: Mutex<HashMap<String, CacheItem>>,
    max_key_length: usize,
}

impl MemoryCache {
    /// Memcache-compatible 250 byte key limit.
    pub fn new() -> Self {
        Self::with_max_key_length(250)
    }

    pub fn with_max_key_length(max_key_length: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            max_key_length,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().values().filter(|item| item.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(ttl_secs: u64) -> Option<Instant> {
        (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClient for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut items = self.items.lock();
        let value = items
            .get(key)
            .filter(|item| item.is_live())
            .map(|item| item.value.clone());
        if value.is_none() {
            items.remove(key);
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        self.items.lock().insert(
            key.to_string(),
            CacheItem {
                value: value.to_string(),
                expires_at: Self::expiry(ttl_secs),
            },
        );
        Ok(true)
    }

    fn append(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut items = self.items.lock();
        let item = items.entry(key.to_string()).or_insert_with(|| CacheItem {
            value: String::new(),
            expires_at: None,
        });
        if !item.is_live() {
            item.value.clear();
        }
        item.value.push_str(value);
        item.expires_at = Self::expiry(ttl_secs);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.items.lock().remove(key).is_some())
    }

    fn max_key_length(&self) -> usize {
        self.max_key_length
    }
}

pub struct CacheProfilerStorage<C: CacheClient> {
    client: C,
    dsn: CacheDsn,
    encoders: EncoderRegistry,
    lifetime: u64,
    /// Serializes index read-modify-write cycles.
    index_lock: Mutex<()>,
}

impl CacheProfilerStorage<MemoryCache> {
    /// Storage over a fresh in-process cache.
    pub fn in_memory(lifetime: u64) -> Result<Self> {
        Self::new("memory:", MemoryCache::new(), lifetime)
    }
}

impl<C: CacheClient> CacheProfilerStorage<C> {
    /// Validate `dsn` and wrap an already configured client.
    pub fn new(dsn: &str, client: C, lifetime: u64) -> Result<Self> {
        let dsn = CacheDsn::parse(dsn)?;
        crate::log_info!(
            LogContext::new("cache"),
            "CACHE_STORAGE_CONFIGURED",
            scheme = format!("{:?}", dsn.scheme),
            lifetime = lifetime
        );

        Ok(Self {
            client,
            dsn,
            encoders: EncoderRegistry::default(),
            lifetime,
            index_lock: Mutex::new(()),
        })
    }

    pub fn add_encoder(&mut self, encoder: Arc<dyn ProfileEncoder>) {
        self.encoders.add(encoder);
    }

    pub fn dsn(&self) -> &CacheDsn {
        &self.dsn
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn item_key(&self, token: &str) -> Result<String> {
        check_token(token)?;
        let key = format!("{}{}", KEY_PREFIX, token);
        let max = self.client.max_key_length();
        if key.len() > max {
            return Err(ProfilerError::KeyTooLong {
                length: key.len(),
                key,
                max,
            });
        }
        Ok(key)
    }
}

impl<C: CacheClient> RecordStore for CacheProfilerStorage<C> {
    fn backend(&self) -> &'static str {
        "cache"
    }

    fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    fn do_write(&self, record: &EncodedRecord, indexed: &IndexEntry) -> Result<bool> {
        let key = self.item_key(&record.token)?;
        let value = serde_json::to_string(&record.to_flat()?)?;

        let _guard = self.index_lock.lock();
        let existed = self.client.get(&key)?.is_some();
        if !self.client.set(&key, &value, self.lifetime)? {
            return Ok(false);
        }

        let index = self.client.get(INDEX_KEY)?.unwrap_or_default();
        if existed || index_log::contains(&index, &record.token) {
            let rewritten = index_log::upsert(&index, indexed)?;
            self.client.set(INDEX_KEY, &rewritten, self.lifetime)
        } else {
            self.client
                .append(INDEX_KEY, &index_log::line(indexed)?, self.lifetime)
        }
    }

    fn do_read(&self, token: &str) -> Result<Option<EncodedRecord>> {
        let key = self.item_key(token)?;
        match self.client.get(&key)? {
            Some(value) => {
                let flat = serde_json::from_str(&value)
                    .map_err(|e| ProfilerError::Decode(format!("{}: {}", key, e)))?;
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
        let index = self.client.get(INDEX_KEY)?.unwrap_or_default();
        Ok(index_log::search(&index, criteria, limit, start, end))
    }

    fn do_purge(&self) -> Result<()> {
        let _guard = self.index_lock.lock();
        let index = match self.client.get(INDEX_KEY)? {
            Some(index) => index,
            None => return Ok(()),
        };

        for token in index_log::tokens(&index) {
            if let Ok(key) = self.item_key(&token) {
                self.client.delete(&key)?;
            }
        }
        self.client.delete(INDEX_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use crate::storage::{CacheScheme, ProfilerStorage};

    #[test]
    fn test_memory_cache_ttl() {
        let cache = MemoryCache::new();
        cache.set("forever", "a", 0).unwrap();
        cache.set("short", "b", 1).unwrap();
        assert_eq!(cache.get("forever").unwrap().as_deref(), Some("a"));
        assert_eq!(cache.get("short").unwrap().as_deref(), Some("b"));

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(cache.get("short").unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_memory_cache_append() {
        let cache = MemoryCache::new();
        cache.append("k", "a", 0).unwrap();
        cache.append("k", "b", 0).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("ab"));
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
    }

    #[test]
    fn test_key_too_long() {
        let storage = CacheProfilerStorage::in_memory(0).unwrap();
        let token = "x".repeat(250);
        let profile = Profile::http(token.as_str(), None, Some("/"), None, None).unwrap();

        let err = storage.write(&profile).unwrap_err();
        assert!(matches!(
            err,
            ProfilerError::KeyTooLong { length: 262, max: 250, .. }
        ));
    }

    #[test]
    fn test_redis_key_limit() {
        let storage = CacheProfilerStorage::new(
            "redis://127.0.0.1:6379",
            MemoryCache::with_max_key_length(CacheScheme::Redis.max_key_length()),
            0,
        )
        .unwrap();
        let token = "x".repeat(250);
        let profile = Profile::http(token.as_str(), None, Some("/"), None, None).unwrap();
        assert!(storage.write(&profile).unwrap());
    }

    #[test]
    fn test_rewrite_keeps_single_index_line() {
        let storage = CacheProfilerStorage::in_memory(0).unwrap();
        let profile = Profile::http("abc123", None, Some("/a"), None, None).unwrap();
        storage.write(&profile).unwrap();
        storage.write(&profile).unwrap();

        let index = storage.client().get(INDEX_KEY).unwrap().unwrap();
        assert_eq!(index_log::parse(&index).len(), 1);
    }

    #[test]
    fn test_purge_removes_items_and_index() {
        let storage = CacheProfilerStorage::in_memory(0).unwrap();
        for token in ["t1", "t2"] {
            let profile = Profile::http(token, None, Some("/"), None, None).unwrap();
            storage.write(&profile).unwrap();
        }
        assert_eq!(storage.client().len(), 3);

        storage.purge().unwrap();
        assert!(storage.client().is_empty());
    }

    #[test]
    fn test_invalid_dsn() {
        let result = CacheProfilerStorage::new("memcache:/127.0.0.1", MemoryCache::new(), 0);
        assert!(matches!(
            result,
            Err(ProfilerError::InvalidDsn { backend: "cache", .. })
        ));
    }
}
