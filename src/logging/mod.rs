//! Structured logging with profile context.
//!
//! Provides logging macros and utilities that include the storage backend
//! and profile token in every log message for easy correlation.

pub mod structured;

pub use structured::*;

/// Initialize the crate logger.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .is_test(cfg!(test))
        .try_init();
}
