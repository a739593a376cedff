//! Timing collector.
//!
//! A shared `Stopwatch` records timed events into sections keyed by profile
//! token. The late `TimeDataCollector` drains the section for a token when
//! the profile is saved, so every timed event of the request is included.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::profile::ProfileData;

use super::{CollectTiming, DataCollector};

/// One timed event inside a stopwatch section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopwatchEvent {
    pub name: String,
    pub category: String,
    /// Start offset from the section start, in milliseconds.
    pub start_ms: f64,
    pub duration_ms: f64,
}

#[derive(Debug)]
struct Section {
    opened: Instant,
    events: Vec<StopwatchEvent>,
}

/// Token-keyed event recorder shared between timed code and the collector.
#[derive(Debug, Default)]
pub struct Stopwatch {
    sections: Mutex<HashMap<String, Section>>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time `f` and record it in the section for `token`.
    pub fn measure<T>(&self, token: &str, name: &str, category: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut sections = self.sections.lock();
        let section = sections.entry(token.to_string()).or_insert_with(|| Section {
            opened: started,
            events: Vec::new(),
        });
        let start_ms = started
            .saturating_duration_since(section.opened)
            .as_secs_f64()
            * 1000.0;
        section.events.push(StopwatchEvent {
            name: name.to_string(),
            category: category.to_string(),
            start_ms,
            duration_ms,
        });

        result
    }

    /// Events recorded so far for `token`.
    pub fn section_events(&self, token: &str) -> Vec<StopwatchEvent> {
        self.sections
            .lock()
            .get(token)
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }

    /// Remove and return the section for `token`.
    pub fn take_section(&self, token: &str) -> Vec<StopwatchEvent> {
        self.sections
            .lock()
            .remove(token)
            .map(|s| s.events)
            .unwrap_or_default()
    }
}

/// Payload of the time collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeData {
    /// Unix time in milliseconds at which the collector was created.
    pub start_time: i64,
    pub events: Vec<StopwatchEvent>,
}

impl TimeData {
    /// Sum of event durations.
    pub fn total_duration_ms(&self) -> f64 {
        self.events.iter().map(|e| e.duration_ms).sum()
    }
}

/// Late collector draining the stopwatch section of the saved profile.
#[derive(Debug, Clone)]
pub struct TimeDataCollector {
    stopwatch: Option<Arc<Stopwatch>>,
    start_time: i64,
}

impl TimeDataCollector {
    pub fn new(stopwatch: Option<Arc<Stopwatch>>) -> Self {
        Self {
            stopwatch,
            start_time: Utc::now().timestamp_millis(),
        }
    }
}

impl DataCollector for TimeDataCollector {
    fn name(&self) -> &str {
        "time"
    }

    fn timing(&self) -> CollectTiming {
        CollectTiming::Late
    }

    fn collect(&self, token: &str) -> anyhow::Result<ProfileData> {
        let events = match &self.stopwatch {
            Some(stopwatch) if !token.is_empty() => stopwatch.take_section(token),
            _ => Vec::new(),
        };

        let data = TimeData {
            start_time: self.start_time,
            events,
        };
        Ok(ProfileData::from_serializable(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_sections_are_per_token() {
        let stopwatch = Stopwatch::new();
        let value = stopwatch.measure("aaa111", "controller", "section", || 42);
        assert_eq!(value, 42);
        stopwatch.measure("aaa111", "template", "render", || ());
        stopwatch.measure("bbb222", "controller", "section", || ());

        assert_eq!(stopwatch.section_events("aaa111").len(), 2);
        assert_eq!(stopwatch.section_events("bbb222").len(), 1);
        assert!(stopwatch.section_events("ccc333").is_empty());
    }

    #[test]
    fn test_collect_drains_section() {
        let stopwatch = Arc::new(Stopwatch::new());
        stopwatch.measure("abc123", "controller", "section", || ());

        let collector = TimeDataCollector::new(Some(stopwatch.clone()));
        assert_eq!(collector.timing(), CollectTiming::Late);

        let data: TimeData = collector.collect("abc123").unwrap().decode().unwrap();
        assert_eq!(data.events.len(), 1);
        assert_eq!(data.events[0].name, "controller");
        assert!(data.total_duration_ms() >= 0.0);

        // The section is reset once collected.
        assert!(stopwatch.section_events("abc123").is_empty());
    }

    #[test]
    fn test_collect_without_stopwatch() {
        let collector = TimeDataCollector::new(None);
        let data: TimeData = collector.collect("abc123").unwrap().decode().unwrap();
        assert!(data.events.is_empty());
    }
}
