//! Collector contract.
//!
//! Collectors are how other subsystems contribute named payloads to a
//! profile. The profiler only needs a name, a timing and a collect call:
//! - `Eager` collectors run when the profile is built
//! - `Late` collectors run when the profile is saved

pub mod memory;
pub mod time;

pub use memory::*;
pub use time::*;

use crate::profile::ProfileData;

/// When a collector produces its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectTiming {
    Eager,
    Late,
}

/// A source of one named profile payload.
///
/// The profile token is passed on every call so collectors can correlate
/// with other per-request telemetry without holding per-request state.
pub trait DataCollector: Send + Sync {
    /// Unique registry key; also the payload's name in the profile.
    fn name(&self) -> &str;

    fn timing(&self) -> CollectTiming {
        CollectTiming::Eager
    }

    fn collect(&self, token: &str) -> anyhow::Result<ProfileData>;
}
