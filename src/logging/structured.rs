//! Structured logging utilities.
//!
//! Provides context-aware logging with the component name and, once known,
//! the profile token included in every log message.

use std::fmt;

/// Logging context for one storage backend or profiler instance.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub token: Option<String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            token: None,
        }
    }

    pub fn with_token(&self, token: &str) -> Self {
        Self {
            component: self.component.clone(),
            token: Some(token.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => write!(f, "[{}] [token={}]", self.component, token),
            None => write!(f, "[{}]", self.component),
        }
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::info!(
            concat!("{} {}", $(" ", stringify!($key), "={}"),*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::warn!(
            concat!("{} {}", $(" ", stringify!($key), "={}"),*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::error!(
            concat!("{} {}", $(" ", stringify!($key), "={}"),*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::debug!(
            concat!("{} {}", $(" ", stringify!($key), "={}"),*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}
