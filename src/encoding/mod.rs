//! Profile encoders.
//!
//! Convert typed profiles into flat storage records and back:
//! - `record` - the encoded record, index entries and blob helpers
//! - `encoder` - the encoder trait, shared encoding and the registry
//! - `http` / `console` - one encoder per profile kind

pub mod console;
pub mod encoder;
pub mod http;
pub mod record;

pub use console::*;
pub use encoder::*;
pub use http::*;
pub use record::*;
