//! Memory usage collector.
//!
//! Reports resident memory of the current process together with the
//! configured memory limit, given in php.ini-style shorthand (`128M`, `1G`).

use std::fs;

use serde::{Deserialize, Serialize};

use crate::profile::ProfileData;

use super::DataCollector;

/// Payload of the memory collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryData {
    /// Resident memory in bytes.
    pub memory: u64,
    /// High water mark of resident memory in bytes.
    pub peak_memory: u64,
    /// Limit in bytes, -1 when unlimited.
    pub memory_limit: i64,
}

/// Eager collector reporting process memory.
#[derive(Debug, Clone)]
pub struct MemoryDataCollector {
    memory_limit: i64,
}

impl MemoryDataCollector {
    pub fn new(memory_limit: &str) -> Self {
        Self {
            memory_limit: convert_to_bytes(memory_limit),
        }
    }

    pub fn memory_limit(&self) -> i64 {
        self.memory_limit
    }
}

impl Default for MemoryDataCollector {
    fn default() -> Self {
        Self::new("-1")
    }
}

impl DataCollector for MemoryDataCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&self, _token: &str) -> anyhow::Result<ProfileData> {
        let (memory, peak_memory) = read_process_memory();
        let data = MemoryData {
            memory,
            peak_memory,
            memory_limit: self.memory_limit,
        };
        Ok(ProfileData::from_serializable(&data)?)
    }
}

/// Convert a shorthand byte size to bytes.
///
/// `-1` means unlimited. A `0x` prefix is hexadecimal, a leading `0` octal.
/// The `k`, `m`, `g` and `t` suffixes scale by powers of 1024.
pub fn convert_to_bytes(memory_limit: &str) -> i64 {
    let limit = memory_limit.trim().to_lowercase();
    if limit == "-1" {
        return -1;
    }

    let max = limit.trim_start_matches('+');
    let mut value = if let Some(hex) = max.strip_prefix("0x") {
        parse_leading(hex, 16)
    } else if max.starts_with('0') {
        parse_leading(max, 8)
    } else {
        parse_leading(max, 10)
    };

    let scale = match limit.chars().last() {
        Some('t') => 4,
        Some('g') => 3,
        Some('m') => 2,
        Some('k') => 1,
        _ => 0,
    };
    for _ in 0..scale {
        value = value.saturating_mul(1024);
    }

    value
}

/// Parse the longest prefix of digits valid in `radix`.
fn parse_leading(digits: &str, radix: u32) -> i64 {
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map(|(i, _)| i)
        .unwrap_or(digits.len());

    i64::from_str_radix(&digits[..end], radix).unwrap_or(0)
}

/// Resident and peak resident memory from `/proc/self/status`.
///
/// Zero on platforms without procfs.
fn read_process_memory() -> (u64, u64) {
    let status = match fs::read_to_string("/proc/self/status") {
        Ok(content) => content,
        Err(_) => return (0, 0),
    };

    let field = |name: &str| -> u64 {
        status
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
            .unwrap_or(0)
    };

    (field("VmRSS:"), field("VmHWM:"))
}
