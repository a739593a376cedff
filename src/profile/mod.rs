//! Profile data model.
//!
//! In-memory profile tree and the named collector payloads it carries.

pub mod data;
pub mod model;

pub use data::*;
pub use model::*;
