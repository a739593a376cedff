//! Error types for the profiler.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Profile token must not be empty")]
    EmptyToken,

    #[error("ProfileData \"{0}\" does not exist")]
    ProfileDataNotFound(String),

    #[error("Collector \"{0}\" does not exist")]
    CollectorNotFound(String),

    #[error("No encoder found for profile kind \"{0}\"")]
    NoEncoderFound(String),

    #[error("The item key \"{key}\" is too long ({length} bytes). Allowed maximum size is {max} bytes")]
    KeyTooLong {
        key: String,
        length: usize,
        max: usize,
    },

    #[error("Invalid {backend} dsn \"{dsn}\". The expected format is \"{expected}\"")]
    InvalidDsn {
        backend: &'static str,
        dsn: String,
        expected: &'static str,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_too_long_message() {
        let err = ProfilerError::KeyTooLong {
            key: "sf_profiler_x".to_string(),
            length: 300,
            max: 250,
        };
        assert!(err.to_string().contains("300 bytes"));
        assert!(err.to_string().contains("250 bytes"));
    }
}
