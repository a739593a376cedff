//! Request, response and command context handed to the profiler.
//!
//! The lifecycle layer builds these from its own types and passes them
//! explicitly on every call, so no request state lives on the profiler.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Response header carrying the profile token.
pub const DEBUG_TOKEN_HEADER: &str = "X-Debug-Token";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInfo {
    pub client_ip: Option<String>,
    pub uri: String,
    pub method: String,
}

impl RequestInfo {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            client_ip: None,
            uri: uri.to_string(),
            method: method.to_string(),
        }
    }

    pub fn with_client_ip(mut self, ip: &str) -> Self {
        self.client_ip = Some(ip.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseInfo {
    pub status_code: u16,
    headers: BTreeMap<String, String>,
}

impl ResponseInfo {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
        }
    }

    /// Header names compare case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers
            .retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.to_string());
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Token set by the profiler, if any.
    pub fn debug_token(&self) -> Option<&str> {
        self.header(DEBUG_TOKEN_HEADER)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandInfo {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub options: Map<String, Value>,
}

impl CommandInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_argument(mut self, name: &str, value: Value) -> Self {
        self.arguments.insert(name.to_string(), value);
        self
    }

    pub fn with_option(mut self, name: &str, value: Value) -> Self {
        self.options.insert(name.to_string(), value);
        self
    }
}
