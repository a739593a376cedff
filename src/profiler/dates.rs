//! Permissive parsing of search window bounds.
//!
//! Accepts unix timestamps and common date phrases. Anything unparseable
//! yields `None`, meaning "no bound". All phrases are read as UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Ordinal suffix on a day number: 1st, 2nd, 3rd, 7th
    static ref ORDINAL: Regex = Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap();

    /// +1 day, -2 hours, 3 weeks ago
    static ref RELATIVE: Regex = Regex::new(
        r"(?i)^([+-]?\d+)\s*(second|sec|minute|min|hour|day|week)s?(\s+ago)?$"
    ).unwrap();
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d %Y", "%d-%m-%Y", "%m/%d/%Y",
];

/// Resolve a date-like input to unix seconds.
pub fn parse_timestamp(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<i64>() {
        return Some(seconds);
    }
    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() {
            return Some(seconds.floor() as i64);
        }
    }

    parse_keyword(value)
        .or_else(|| parse_relative(value))
        .or_else(|| parse_absolute(value))
}

fn midnight(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp())
}

fn parse_keyword(value: &str) -> Option<i64> {
    let now = Utc::now();
    match value.to_ascii_lowercase().as_str() {
        "now" => Some(now.timestamp()),
        "today" | "midnight" => midnight(now.date_naive()),
        "yesterday" => midnight(now.date_naive() - Duration::days(1)),
        "tomorrow" => midnight(now.date_naive() + Duration::days(1)),
        _ => None,
    }
}

fn parse_relative(value: &str) -> Option<i64> {
    let caps = RELATIVE.captures(value)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit: i64 = match caps[2].to_ascii_lowercase().as_str() {
        "second" | "sec" => 1,
        "minute" | "min" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        _ => 604_800,
    };
    let amount = if caps.get(3).is_some() { -amount } else { amount };
    Utc::now().timestamp().checked_add(unit.checked_mul(amount)?)
}

fn parse_absolute(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp());
        }
    }

    // "7th April 2014", "April 7th, 2014"
    let cleaned = ORDINAL.replace_all(value, "$1").replace(',', " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
        .and_then(midnight)
}
