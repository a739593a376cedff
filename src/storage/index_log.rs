//! Newline-delimited index log.
//!
//! Backends without native queries keep one JSON index entry per line.
//! Searching scans the whole log, keeps the latest line per token, filters,
//! sorts by time descending and only then applies the limit.

use std::collections::HashSet;

use crate::encoding::IndexEntry;
use crate::errors::Result;

use super::criteria::{in_window, matches, Criteria};

/// One log line for `entry`, newline included.
pub fn line(entry: &IndexEntry) -> Result<String> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    Ok(line)
}

/// Parse the log, skipping blank and malformed lines.
pub fn parse(content: &str) -> Vec<IndexEntry> {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str::<IndexEntry>(l) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("INDEX_LINE_SKIPPED error={}", e);
                None
            }
        })
        .collect()
}

/// Newest entry per token, most recently appended first.
fn latest_per_token(content: &str) -> Vec<IndexEntry> {
    let mut seen = HashSet::new();
    parse(content)
        .into_iter()
        .rev()
        .filter(|entry| seen.insert(entry.token().to_string()))
        .collect()
}

/// Tokens referenced by the log.
pub fn tokens(content: &str) -> Vec<String> {
    latest_per_token(content)
        .into_iter()
        .map(|entry| entry.token().to_string())
        .collect()
}

/// Whether the log already holds an entry for `token`.
pub fn contains(content: &str, token: &str) -> bool {
    parse(content).iter().any(|entry| entry.token() == token)
}

/// Rewrite the log with `entry` replacing any line for the same token.
pub fn upsert(content: &str, entry: &IndexEntry) -> Result<String> {
    let mut out = String::with_capacity(content.len());
    for existing in parse(content) {
        if existing.token() != entry.token() {
            out.push_str(&line(&existing)?);
        }
    }
    out.push_str(&line(entry)?);
    Ok(out)
}

/// Run a criteria search over the log.
pub fn search(
    content: &str,
    criteria: &Criteria,
    limit: usize,
    start: Option<i64>,
    end: Option<i64>,
) -> Vec<IndexEntry> {
    if limit == 0 {
        return Vec::new();
    }

    let mut result: Vec<IndexEntry> = latest_per_token(content)
        .into_iter()
        .filter(|entry| in_window(entry.time(), start, end))
        .filter(|entry| matches(entry, criteria))
        .collect();

    // Stable: equal times keep newest-append-first order.
    result.sort_by(|a, b| b.time().cmp(&a.time()));
    result.truncate(limit);
    result
}
