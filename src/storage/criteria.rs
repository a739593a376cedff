//! Search criteria over indexed fields.
//!
//! String fields match by literal substring containment. `%` and `_` carry
//! no wildcard meaning. Numeric fields match by equality.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::encoding::IndexEntry;

/// Indexed fields compared by equality rather than containment.
pub const EXACT_FIELDS: &[&str] = &["status_code", "exit_code", "time"];

pub fn is_exact_field(field: &str) -> bool {
    EXACT_FIELDS.contains(&field)
}

/// Mapping of indexed field name to the value it must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria(BTreeMap<String, String>);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl ToString) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl ToString) {
        self.0.insert(field.to_string(), value.to_string());
    }

    pub fn ip(self, ip: &str) -> Self {
        self.with("ip", ip)
    }

    pub fn url(self, url: &str) -> Self {
        self.with("url", url)
    }

    pub fn method(self, method: &str) -> Self {
        self.with("method", method)
    }

    pub fn status_code(self, status_code: u16) -> Self {
        self.with("status_code", status_code)
    }

    pub fn command(self, command: &str) -> Self {
        self.with("command", command)
    }

    pub fn exit_code(self, exit_code: i32) -> Self {
        self.with("exit_code", exit_code)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Whether `time` lies in the inclusive window.
pub fn in_window(time: i64, start: Option<i64>, end: Option<i64>) -> bool {
    start.map_or(true, |start| time >= start) && end.map_or(true, |end| time <= end)
}

/// Whether an index entry satisfies every criterion.
///
/// A criterion on a field the entry does not carry never matches.
pub fn matches(entry: &IndexEntry, criteria: &Criteria) -> bool {
    criteria.iter().all(|(field, expected)| match entry.get(field) {
        Some(Value::String(actual)) if is_exact_field(field) => actual == expected,
        Some(Value::String(actual)) => actual.contains(expected),
        Some(Value::Number(actual)) => actual.to_string() == expected,
        Some(Value::Bool(actual)) => actual.to_string() == expected,
        _ => false,
    })
}
