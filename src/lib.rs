//! Profiler Core - token-addressed profile capture and storage
//!
//! This crate captures per-request (HTTP) and per-invocation (console)
//! diagnostic data, stores it under a short token, and finds it again by
//! token or by indexed criteria. The implementation prioritizes:
//!
//! 1. **Safety** - Profiling never aborts the request or command it observes
//! 2. **Logging** - Every storage decision logged with backend and token
//! 3. **Portability** - One storage contract over file, SQL, cache and document stores
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `profile` - Profile tree, kinds and named payloads
//! - `collectors` - Collector contract plus memory and time collectors
//! - `encoding` - Profile <-> flat record encoders and their registry
//! - `storage` - Storage contract, criteria search and the four backends
//! - `profiler` - Orchestrator, tokens, date parsing, export/import
//! - `config` - DSN based storage configuration
//! - `logging` - Structured logging with profile context
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use profiler_core::{CacheProfilerStorage, Profiler, RequestInfo, ResponseInfo};
//!
//! let storage = CacheProfilerStorage::in_memory(3600).unwrap();
//! let profiler = Profiler::new(Arc::new(storage));
//!
//! let mut response = ResponseInfo::new(200);
//! let request = RequestInfo::new("GET", "http://example.com/").with_client_ip("127.0.0.1");
//! let mut profile = profiler.profile_request(&request, &mut response).unwrap();
//! assert!(profiler.save(&mut profile).unwrap());
//!
//! let loaded = profiler.load_from_response(&response).unwrap().unwrap();
//! assert_eq!(loaded.url(), Some("http://example.com/"));
//! ```

pub mod collectors;
pub mod config;
pub mod encoding;
pub mod errors;
pub mod logging;
pub mod profile;
pub mod profiler;
pub mod storage;

pub use collectors::{CollectTiming, DataCollector};
pub use config::{open_storage, StorageConfig};
pub use encoding::{EncodedRecord, EncoderRegistry, IndexEntry, ProfileEncoder};
pub use errors::{ProfilerError, Result};
pub use logging::init_logger;
pub use profile::{DataEntry, Profile, ProfileData, ProfileKind};
pub use profiler::{CommandInfo, Profiler, RequestInfo, ResponseInfo};
pub use storage::{
    CacheProfilerStorage, Criteria, DocumentProfilerStorage, FileProfilerStorage,
    ProfilerStorage, SqliteProfilerStorage,
};
