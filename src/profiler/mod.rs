//! Profiler orchestration.
//!
//! - `orchestrator`: the `Profiler` and its collector registry
//! - `context`: request, response and command inputs
//! - `token`: token generation
//! - `dates`: search window parsing
//! - `transfer`: export and import of profile trees

pub mod context;
pub mod dates;
pub mod orchestrator;
pub mod token;
pub mod transfer;

pub use context::*;
pub use dates::*;
pub use orchestrator::*;
pub use token::*;
pub use transfer::*;
