//! DSN parsing for the network-backed storages.
//!
//! Parsing only validates shape. Connections are owned by the injected
//! client, so a well-formed DSN never opens a socket here.

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{ProfilerError, Result};

lazy_static! {
    /// scheme://[user[:password]@]host:port[/db]
    static ref CACHE_DSN: Regex = Regex::new(
        r"^(memcache|memcached|redis)://(?:([^:@/]*)(?::([^@/]*))?@)?([^:/@]+):(\d+)(?:/(\d+))?$"
    ).unwrap();

    /// mongodb://server/database/collection
    static ref DOCUMENT_DSN: Regex = Regex::new(r"^(mongodb://.*)/(.*)/(.*)$").unwrap();
}

const CACHE_DSN_FORMAT: &str = "memcache://host:port";
const DOCUMENT_DSN_FORMAT: &str = "mongodb://[user:pass@]host/database/collection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScheme {
    Memcache,
    Memcached,
    Redis,
    /// In-process cache, `memory:`.
    Memory,
}

impl CacheScheme {
    /// Longest item key the scheme's server accepts.
    pub fn max_key_length(&self) -> usize {
        match self {
            CacheScheme::Memcache | CacheScheme::Memcached | CacheScheme::Memory => 250,
            CacheScheme::Redis => 2_147_483_648,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDsn {
    pub scheme: CacheScheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<u32>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CacheDsn {
    pub fn parse(dsn: &str) -> Result<Self> {
        if dsn == "memory:" {
            return Ok(Self {
                scheme: CacheScheme::Memory,
                host: None,
                port: None,
                database: None,
                username: None,
                password: None,
            });
        }

        let invalid = || ProfilerError::InvalidDsn {
            backend: "cache",
            dsn: dsn.to_string(),
            expected: CACHE_DSN_FORMAT,
        };

        let caps = CACHE_DSN.captures(dsn).ok_or_else(invalid)?;
        let scheme = match &caps[1] {
            "memcache" => CacheScheme::Memcache,
            "memcached" => CacheScheme::Memcached,
            _ => CacheScheme::Redis,
        };
        let port = caps[5].parse::<u16>().map_err(|_| invalid())?;
        let database = match caps.get(6) {
            Some(db) => Some(db.as_str().parse::<u32>().map_err(|_| invalid())?),
            None => None,
        };
        let non_empty = |i: usize| {
            caps.get(i)
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty())
        };

        Ok(Self {
            scheme,
            host: Some(caps[4].to_string()),
            port: Some(port),
            database,
            username: non_empty(2),
            password: non_empty(3),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDsn {
    pub server: String,
    pub database: String,
    pub collection: String,
}

impl DocumentDsn {
    pub fn parse(dsn: &str) -> Result<Self> {
        let invalid = || ProfilerError::InvalidDsn {
            backend: "document",
            dsn: dsn.to_string(),
            expected: DOCUMENT_DSN_FORMAT,
        };

        let caps = DOCUMENT_DSN.captures(dsn).ok_or_else(invalid)?;
        let (server, database, collection) = (&caps[1], &caps[2], &caps[3]);
        if server.len() <= "mongodb://".len() || database.is_empty() || collection.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            server: server.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
        })
    }
}
