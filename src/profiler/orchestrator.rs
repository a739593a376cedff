//! The profiler.
//!
//! Builds profiles for finished requests and commands, runs the registered
//! collectors, and hands profiles to storage. Profiling is auxiliary work:
//! collector and write failures are logged and never abort the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::collectors::{CollectTiming, DataCollector};
use crate::encoding::IndexEntry;
use crate::errors::{ProfilerError, Result};
use crate::logging::LogContext;
use crate::profile::{DataEntry, Profile};
use crate::storage::{Criteria, ProfilerStorage};

use super::context::{CommandInfo, RequestInfo, ResponseInfo, DEBUG_TOKEN_HEADER};
use super::dates::parse_timestamp;
use super::token::generate_token;
use super::transfer::{export_profile, import_profile};

pub struct Profiler {
    storage: Arc<dyn ProfilerStorage>,
    /// Registration order is collection order. Names are unique.
    collectors: Vec<Arc<dyn DataCollector>>,
    enabled: AtomicBool,
    logging: bool,
    ctx: LogContext,
}

impl Profiler {
    pub fn new(storage: Arc<dyn ProfilerStorage>) -> Self {
        Self {
            storage,
            collectors: Vec::new(),
            enabled: AtomicBool::new(true),
            logging: true,
            ctx: LogContext::new("profiler"),
        }
    }

    /// A profiler that does not log collector or write failures.
    pub fn without_logging(storage: Arc<dyn ProfilerStorage>) -> Self {
        Self {
            logging: false,
            ..Self::new(storage)
        }
    }

    pub fn storage(&self) -> &dyn ProfilerStorage {
        self.storage.as_ref()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn load(&self, token: &str) -> Result<Option<Profile>> {
        self.storage.read(token)
    }

    /// Load the profile whose token the response carries.
    pub fn load_from_response(&self, response: &ResponseInfo) -> Result<Option<Profile>> {
        match response.debug_token() {
            Some(token) => self.load(token),
            None => Ok(None),
        }
    }

    /// Resolve pending entries across the tree, then write it.
    ///
    /// Returns `Ok(false)` when the write failed for a runtime reason; the
    /// failure is logged. Configuration errors are returned.
    pub fn save(&self, profile: &mut Profile) -> Result<bool> {
        self.resolve_pending(profile);

        match self.storage.write(profile) {
            Ok(true) => Ok(true),
            Ok(false) => {
                if self.logging {
                    crate::log_warn!(
                        self.ctx.with_token(profile.token()),
                        "PROFILE_WRITE_FAILED",
                        reason = "storage refused the record"
                    );
                }
                Ok(false)
            }
            Err(e @ ProfilerError::NoEncoderFound(_))
            | Err(e @ ProfilerError::KeyTooLong { .. })
            | Err(e @ ProfilerError::InvalidDsn { .. }) => Err(e),
            Err(e) => {
                if self.logging {
                    crate::log_warn!(
                        self.ctx.with_token(profile.token()),
                        "PROFILE_WRITE_FAILED",
                        error = e
                    );
                }
                Ok(false)
            }
        }
    }

    fn resolve_pending(&self, profile: &mut Profile) {
        let token = profile.token().to_string();

        for name in profile.pending_names() {
            let collector = match profile.get(&name) {
                Ok(DataEntry::Pending(Some(collector))) => Arc::clone(collector),
                _ => {
                    crate::log_debug!(self.ctx.with_token(&token), "PENDING_DETACHED", name = name);
                    continue;
                }
            };

            match collector.collect(&token) {
                Ok(payload) => profile.add(&name, payload),
                Err(e) => {
                    profile.remove(&name);
                    self.collector_failed(&token, &name, &e);
                }
            }
        }

        for child in profile.children_mut() {
            self.resolve_pending(child);
        }
    }

    fn collector_failed(&self, token: &str, name: &str, error: &anyhow::Error) {
        if self.logging {
            crate::log_warn!(
                self.ctx.with_token(token),
                "COLLECTOR_FAILED",
                collector = name,
                error = error
            );
        }
    }

    pub fn purge(&self) -> Result<()> {
        self.storage.purge()
    }

    pub fn export(&self, profile: &Profile) -> Result<String> {
        export_profile(profile)
    }

    /// Import an exported tree.
    ///
    /// Returns `Ok(None)` when a profile with the same token is already
    /// stored; existing profiles are never overwritten.
    pub fn import(&self, data: &str) -> Result<Option<Profile>> {
        let mut profile = import_profile(data)?;

        if self.storage.read(profile.token())?.is_some() {
            crate::log_info!(self.ctx.with_token(profile.token()), "IMPORT_CONFLICT");
            return Ok(None);
        }

        self.save(&mut profile)?;
        Ok(Some(profile))
    }

    /// Search with `ip`, `url` and `method` criteria; empty values are ignored.
    pub fn find(
        &self,
        ip: Option<&str>,
        url: Option<&str>,
        limit: usize,
        method: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<IndexEntry>> {
        let mut criteria = Criteria::new();
        for (field, value) in [("ip", ip), ("url", url), ("method", method)] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                criteria.insert(field, value);
            }
        }
        self.find_by(&criteria, limit, start, end)
    }

    /// Search storage. Bounds accept timestamps or date phrases; anything
    /// unparseable leaves that side of the window open.
    pub fn find_by(
        &self,
        criteria: &Criteria,
        limit: usize,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<IndexEntry>> {
        let start = parse_timestamp(start);
        let end = parse_timestamp(end);
        crate::log_debug!(
            self.ctx,
            "FIND_BY",
            criteria = criteria.len(),
            limit = limit,
            start = format!("{:?}", start),
            end = format!("{:?}", end)
        );
        self.storage.find_by(criteria, limit, start, end)
    }

    /// Profile a finished request and tag the response with the token.
    pub fn profile_request(
        &self,
        request: &RequestInfo,
        response: &mut ResponseInfo,
    ) -> Option<Profile> {
        if !self.is_enabled() {
            return None;
        }

        let token = generate_token();
        let profile = Profile::http(
            token.as_str(),
            request.client_ip.as_deref(),
            Some(request.uri.as_str()),
            Some(request.method.as_str()),
            Some(response.status_code),
        );
        let profile = self.built(profile)?;
        response.set_header(DEBUG_TOKEN_HEADER, &token);

        Some(self.profile(profile))
    }

    /// Profile a finished command.
    pub fn profile_command(&self, command: &CommandInfo, exit_code: i32) -> Option<Profile> {
        if !self.is_enabled() {
            return None;
        }

        let profile = Profile::console(
            generate_token(),
            &command.name,
            command.arguments.clone(),
            command.options.clone(),
            exit_code,
        );
        let profile = self.built(profile)?;

        Some(self.profile(profile))
    }

    fn built(&self, profile: Result<Profile>) -> Option<Profile> {
        match profile {
            Ok(profile) => Some(profile),
            Err(e) => {
                crate::log_error!(self.ctx, "PROFILE_BUILD_FAILED", error = e);
                None
            }
        }
    }

    /// Run eager collectors now and attach late ones as pending entries.
    pub fn profile(&self, mut profile: Profile) -> Profile {
        let token = profile.token().to_string();

        for collector in &self.collectors {
            match collector.timing() {
                CollectTiming::Eager => match collector.collect(&token) {
                    Ok(payload) => profile.add(collector.name(), payload),
                    Err(e) => self.collector_failed(&token, collector.name(), &e),
                },
                CollectTiming::Late => {
                    profile.add_pending(collector.name(), Some(Arc::clone(collector)));
                }
            }
        }

        profile
    }

    pub fn all(&self) -> &[Arc<dyn DataCollector>] {
        &self.collectors
    }

    /// Replace the registry.
    pub fn set(&mut self, collectors: Vec<Arc<dyn DataCollector>>) {
        self.collectors.clear();
        for collector in collectors {
            self.add(collector);
        }
    }

    /// Register a collector, replacing one with the same name in place.
    pub fn add(&mut self, collector: Arc<dyn DataCollector>) {
        match self
            .collectors
            .iter_mut()
            .find(|existing| existing.name() == collector.name())
        {
            Some(existing) => *existing = collector,
            None => self.collectors.push(collector),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.collectors.iter().any(|c| c.name() == name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn DataCollector>> {
        self.collectors
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| ProfilerError::CollectorNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use crate::collectors::{Stopwatch, TimeData, TimeDataCollector};
    use crate::profile::ProfileData;
    use crate::storage::CacheProfilerStorage;

    struct NamedCollector {
        name: &'static str,
        timing: CollectTiming,
        calls: AtomicUsize,
    }

    impl NamedCollector {
        fn new(name: &'static str, timing: CollectTiming) -> Arc<Self> {
            Arc::new(Self {
                name,
                timing,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl DataCollector for NamedCollector {
        fn name(&self) -> &str {
            self.name
        }

        fn timing(&self) -> CollectTiming {
            self.timing
        }

        fn collect(&self, token: &str) -> anyhow::Result<ProfileData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProfileData::new(json!({"collector": self.name, "token": token})))
        }
    }

    struct BrokenCollector;

    impl DataCollector for BrokenCollector {
        fn name(&self) -> &str {
            "broken"
        }

        fn collect(&self, _token: &str) -> anyhow::Result<ProfileData> {
            anyhow::bail!("collector exploded")
        }
    }

    /// Storage that records write attempts and answers with a fixed outcome.
    struct ScriptedStorage {
        writes: AtomicUsize,
        outcome: fn() -> Result<bool>,
    }

    impl ScriptedStorage {
        fn new(outcome: fn() -> Result<bool>) -> Arc<Self> {
            Arc::new(Self {
                writes: AtomicUsize::new(0),
                outcome,
            })
        }
    }

    impl ProfilerStorage for ScriptedStorage {
        fn write(&self, _profile: &Profile) -> Result<bool> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }

        fn read(&self, _token: &str) -> Result<Option<Profile>> {
            Ok(None)
        }

        fn find_by(
            &self,
            _criteria: &Criteria,
            _limit: usize,
            _start: Option<i64>,
            _end: Option<i64>,
        ) -> Result<Vec<IndexEntry>> {
            Ok(Vec::new())
        }

        fn purge(&self) -> Result<()> {
            Ok(())
        }
    }

    fn memory_profiler() -> Profiler {
        Profiler::new(Arc::new(CacheProfilerStorage::in_memory(0).unwrap()))
    }

    #[test]
    fn test_disabled_profiler_is_noop() {
        let storage = ScriptedStorage::new(|| Ok(true));
        let profiler = Profiler::new(storage.clone());
        profiler.disable();

        let mut response = ResponseInfo::new(200);
        assert!(profiler
            .profile_request(&RequestInfo::new("GET", "/"), &mut response)
            .is_none());
        assert!(profiler
            .profile_command(&CommandInfo::new("cache:clear"), 0)
            .is_none());
        assert!(response.debug_token().is_none());
        assert_eq!(storage.writes.load(Ordering::SeqCst), 0);

        profiler.enable();
        assert!(profiler.profile_command(&CommandInfo::new("cache:clear"), 0).is_some());
    }

    #[test]
    fn test_profile_request_tags_response() {
        let profiler = memory_profiler();
        let request = RequestInfo::new("POST", "http://example.com/login").with_client_ip("10.0.0.1");
        let mut response = ResponseInfo::new(302);

        let profile = profiler.profile_request(&request, &mut response).unwrap();
        assert_eq!(response.debug_token(), Some(profile.token()));
        assert_eq!(profile.ip(), Some("10.0.0.1"));
        assert_eq!(profile.url(), Some("http://example.com/login"));
        assert_eq!(profile.method(), Some("POST"));
        assert_eq!(profile.status_code(), Some(302));
    }

    #[test]
    fn test_profile_command() {
        let profiler = memory_profiler();
        let command = CommandInfo::new("cache:clear")
            .with_argument("command", json!("cache:clear"))
            .with_option("env", json!("prod"));

        let profile = profiler.profile_command(&command, 3).unwrap();
        assert_eq!(profile.command(), Some("cache:clear"));
        assert_eq!(profile.exit_code(), Some(3));
        assert_eq!(profile.options().unwrap()["env"], json!("prod"));
    }

    #[test]
    fn test_late_collector_resolved_at_save() {
        let mut profiler = memory_profiler();
        let eager = NamedCollector::new("request", CollectTiming::Eager);
        let late = NamedCollector::new("events", CollectTiming::Late);
        profiler.add(eager.clone());
        profiler.add(late.clone());

        let mut response = ResponseInfo::new(200);
        let mut profile = profiler
            .profile_request(&RequestInfo::new("GET", "/"), &mut response)
            .unwrap();

        assert!(profile.payload("request").is_some());
        assert!(profile.payload("events").is_none());
        assert!(profile.get("events").unwrap().is_pending());
        assert_eq!(late.calls.load(Ordering::SeqCst), 0);

        assert!(profiler.save(&mut profile).unwrap());
        assert_eq!(late.calls.load(Ordering::SeqCst), 1);
        let payload = profile.payload("events").unwrap();
        assert_eq!(payload.value()["token"], json!(profile.token()));
        assert!(profile.pending_names().is_empty());

        let stored = profiler.load(profile.token()).unwrap().unwrap();
        assert!(stored.payload("events").is_some());
        assert_eq!(eager.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_time_collector_reads_stopwatch() {
        let stopwatch = Arc::new(Stopwatch::new());
        let mut profiler = memory_profiler();
        profiler.add(Arc::new(TimeDataCollector::new(Some(stopwatch.clone()))));

        let mut response = ResponseInfo::new(200);
        let mut profile = profiler
            .profile_request(&RequestInfo::new("GET", "/"), &mut response)
            .unwrap();
        stopwatch.measure(profile.token(), "controller", "section", || ());

        profiler.save(&mut profile).unwrap();
        let time: TimeData = profile.payload("time").unwrap().decode().unwrap();
        assert_eq!(time.events.len(), 1);
        assert!(stopwatch.section_events(profile.token()).is_empty());
    }

    #[test]
    fn test_failing_collector_is_dropped() {
        let mut profiler = Profiler::without_logging(Arc::new(
            CacheProfilerStorage::in_memory(0).unwrap(),
        ));
        profiler.add(Arc::new(BrokenCollector));

        let profile = profiler.profile_command(&CommandInfo::new("list"), 0).unwrap();
        assert!(!profile.has("broken"));
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let refused = Profiler::new(ScriptedStorage::new(|| Ok(false)));
        let mut profile = Profile::http("abc123", None, Some("/"), None, None).unwrap();
        assert!(!refused.save(&mut profile).unwrap());

        let broken = Profiler::new(ScriptedStorage::new(|| {
            Err(ProfilerError::Storage("disk full".to_string()))
        }));
        assert!(!broken.save(&mut profile).unwrap());
    }

    #[test]
    fn test_config_errors_surface_from_save() {
        let profiler = Profiler::new(ScriptedStorage::new(|| {
            Err(ProfilerError::NoEncoderFound("http".to_string()))
        }));
        let mut profile = Profile::http("abc123", None, Some("/"), None, None).unwrap();
        assert!(matches!(
            profiler.save(&mut profile),
            Err(ProfilerError::NoEncoderFound(_))
        ));
    }

    #[test]
    fn test_import_conflict() {
        let profiler = memory_profiler();
        let mut profile = Profile::http("abc123", Some("127.0.0.1"), Some("/"), Some("GET"), Some(200))
            .unwrap();
        profile.add("request", ProfileData::new(json!({"route": "home"})));
        let blob = profiler.export(&profile).unwrap();

        let imported = profiler.import(&blob).unwrap().unwrap();
        assert_eq!(imported, profile);
        assert!(profiler.import(&blob).unwrap().is_none());
    }

    #[test]
    fn test_find_with_date_phrases() {
        let profiler = memory_profiler();
        for (token, time) in [("t0", 1_396_828_800), ("t1", 1_396_915_200), ("t2", 1_397_001_600)] {
            let mut profile = Profile::http(token, Some("127.0.0.1"), Some("/"), Some("GET"), Some(200))
                .unwrap()
                .with_time(time);
            profiler.save(&mut profile).unwrap();
        }

        let tokens = |found: Vec<IndexEntry>| {
            found
                .iter()
                .map(|e| e.token().to_string())
                .collect::<Vec<_>>()
        };

        let window = profiler
            .find(Some("127.0.0.1"), None, 10, Some("GET"), Some("8th April 2014"), Some("9th April 2014"))
            .unwrap();
        assert_eq!(tokens(window), vec!["t2", "t1"]);

        let unbounded = profiler
            .find(None, Some(""), 10, None, Some("some string"), Some(""))
            .unwrap();
        assert_eq!(tokens(unbounded), vec!["t2", "t1", "t0"]);

        let numeric = profiler
            .find_by(&Criteria::new(), 10, Some("1396915200"), Some("1396915200"))
            .unwrap();
        assert_eq!(tokens(numeric), vec!["t1"]);
    }

    #[test]
    fn test_load_from_response() {
        let profiler = memory_profiler();
        let mut response = ResponseInfo::new(200);
        assert!(profiler.load_from_response(&response).unwrap().is_none());

        let mut profile = profiler
            .profile_request(&RequestInfo::new("GET", "/"), &mut response)
            .unwrap();
        profiler.save(&mut profile).unwrap();

        let loaded = profiler.load_from_response(&response).unwrap().unwrap();
        assert_eq!(loaded.token(), profile.token());
    }

    #[test]
    fn test_collector_registry() {
        let mut profiler = memory_profiler();
        let request: Arc<dyn DataCollector> = NamedCollector::new("request", CollectTiming::Eager);
        let events: Arc<dyn DataCollector> = NamedCollector::new("events", CollectTiming::Late);
        profiler.set(vec![request, events]);
        assert!(profiler.has("request"));
        assert_eq!(profiler.all().len(), 2);

        profiler.add(NamedCollector::new("request", CollectTiming::Late));
        assert_eq!(profiler.all().len(), 2);
        assert_eq!(profiler.all()[0].timing(), CollectTiming::Late);

        assert!(profiler.get("events").is_ok());
        assert!(matches!(
            profiler.get("missing"),
            Err(ProfilerError::CollectorNotFound(name)) if name == "missing"
        ));
    }
}
