//! Profile entity graph.
//!
//! A profile is either an HTTP request profile or a console command profile.
//! Profiles form a tree: a parent owns its children, and each child keeps
//! the parent's token as a lazy back-reference.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collectors::DataCollector;
use crate::errors::{ProfilerError, Result};

use super::data::{DataEntry, ProfileData};

/// Indexed attributes of an HTTP request profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpDetails {
    pub ip: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
}

/// Attributes of a console command profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleDetails {
    pub command: String,
    pub arguments: Map<String, Value>,
    pub options: Map<String, Value>,
    pub exit_code: i32,
}

/// Closed set of profile variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileKind {
    Http(HttpDetails),
    Console(ConsoleDetails),
}

impl ProfileKind {
    pub const HTTP: &'static str = "http";
    pub const CONSOLE: &'static str = "console";

    /// Discriminator stored alongside encoded records.
    pub fn discriminator(&self) -> &'static str {
        match self {
            ProfileKind::Http(_) => Self::HTTP,
            ProfileKind::Console(_) => Self::CONSOLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    token: String,
    time: i64,
    kind: ProfileKind,
    parent_token: Option<String>,
    parent: Option<Box<Profile>>,
    children: Vec<Profile>,
    data: BTreeMap<String, DataEntry>,
}

impl Profile {
    /// Create a profile stamped with the current time.
    pub fn new(token: impl Into<String>, kind: ProfileKind) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(ProfilerError::EmptyToken);
        }

        Ok(Self {
            token,
            time: Utc::now().timestamp(),
            kind,
            parent_token: None,
            parent: None,
            children: Vec::new(),
            data: BTreeMap::new(),
        })
    }

    pub fn http(
        token: impl Into<String>,
        ip: Option<&str>,
        url: Option<&str>,
        method: Option<&str>,
        status_code: Option<u16>,
    ) -> Result<Self> {
        Self::new(
            token,
            ProfileKind::Http(HttpDetails {
                ip: ip.map(str::to_string),
                url: url.map(str::to_string),
                method: method.map(str::to_string),
                status_code,
            }),
        )
    }

    pub fn console(
        token: impl Into<String>,
        command: &str,
        arguments: Map<String, Value>,
        options: Map<String, Value>,
        exit_code: i32,
    ) -> Result<Self> {
        Self::new(
            token,
            ProfileKind::Console(ConsoleDetails {
                command: command.to_string(),
                arguments,
                options,
                exit_code,
            }),
        )
    }

    /// Override the creation time (unix seconds).
    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn kind(&self) -> &ProfileKind {
        &self.kind
    }

    /// Token of the parent profile. Never loads the parent itself.
    pub fn parent_token(&self) -> Option<&str> {
        self.parent_token.as_deref()
    }

    /// The resolved parent, present only when storage attached it.
    pub fn parent(&self) -> Option<&Profile> {
        self.parent.as_deref()
    }

    pub fn set_parent(&mut self, parent: Profile) {
        self.parent_token = Some(parent.token.clone());
        self.parent = Some(Box::new(parent));
    }

    pub(crate) fn set_parent_token(&mut self, token: Option<String>) {
        self.parent_token = token;
    }

    pub fn children(&self) -> &[Profile] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Profile] {
        &mut self.children
    }

    /// Append a child and point its parent token at this profile.
    pub fn add_child(&mut self, mut child: Profile) {
        child.parent_token = Some(self.token.clone());
        self.children.push(child);
    }

    pub fn set_children(&mut self, children: Vec<Profile>) {
        self.children.clear();
        for child in children {
            self.add_child(child);
        }
    }

    pub fn data(&self) -> &BTreeMap<String, DataEntry> {
        &self.data
    }

    pub fn set_data(&mut self, data: BTreeMap<String, ProfileData>) {
        self.data.clear();
        for (name, payload) in data {
            self.add(&name, payload);
        }
    }

    /// Insert or overwrite a resolved payload.
    pub fn add(&mut self, name: &str, payload: ProfileData) {
        self.data
            .insert(name.to_string(), DataEntry::Resolved(payload));
    }

    /// Register a late collector whose payload is computed at save time.
    pub fn add_pending(&mut self, name: &str, collector: Option<Arc<dyn DataCollector>>) {
        self.data
            .insert(name.to_string(), DataEntry::Pending(collector));
    }

    pub fn get(&self, name: &str) -> Result<&DataEntry> {
        self.data
            .get(name)
            .ok_or_else(|| ProfilerError::ProfileDataNotFound(name.to_string()))
    }

    /// Resolved payload for `name`, if any.
    pub fn payload(&self, name: &str) -> Option<&ProfileData> {
        self.data.get(name).and_then(DataEntry::payload)
    }

    pub fn has(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<DataEntry> {
        self.data.remove(name)
    }

    /// Names of entries still waiting for a late collector.
    pub fn pending_names(&self) -> Vec<String> {
        self.data
            .iter()
            .filter(|(_, entry)| entry.is_pending())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn ip(&self) -> Option<&str> {
        match &self.kind {
            ProfileKind::Http(http) => http.ip.as_deref(),
            ProfileKind::Console(_) => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            ProfileKind::Http(http) => http.url.as_deref(),
            ProfileKind::Console(_) => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match &self.kind {
            ProfileKind::Http(http) => http.method.as_deref(),
            ProfileKind::Console(_) => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.kind {
            ProfileKind::Http(http) => http.status_code,
            ProfileKind::Console(_) => None,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match &self.kind {
            ProfileKind::Console(console) => Some(&console.command),
            ProfileKind::Http(_) => None,
        }
    }

    pub fn arguments(&self) -> Option<&Map<String, Value>> {
        match &self.kind {
            ProfileKind::Console(console) => Some(&console.arguments),
            ProfileKind::Http(_) => None,
        }
    }

    pub fn options(&self) -> Option<&Map<String, Value>> {
        match &self.kind {
            ProfileKind::Console(console) => Some(&console.options),
            ProfileKind::Http(_) => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match &self.kind {
            ProfileKind::Console(console) => Some(console.exit_code),
            ProfileKind::Http(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn http(token: &str) -> Profile {
        Profile::http(token, Some("127.0.0.1"), Some("http://foo.bar/"), Some("GET"), Some(200))
            .unwrap()
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            Profile::http("", None, None, None, None),
            Err(ProfilerError::EmptyToken)
        ));
    }

    #[test]
    fn test_time_defaults_to_now() {
        let before = Utc::now().timestamp();
        let profile = http("abc123");
        assert!(profile.time() >= before);

        let fixed = http("abc123").with_time(1_400_000_000);
        assert_eq!(fixed.time(), 1_400_000_000);
    }

    #[test]
    fn test_add_child_sets_parent_token() {
        let mut parent = http("parent");
        parent.add_child(http("child"));

        assert_eq!(parent.children().len(), 1);
        assert_eq!(parent.children()[0].parent_token(), Some("parent"));
        assert!(parent.children()[0].parent().is_none());
        assert!(parent.parent_token().is_none());
    }

    #[test]
    fn test_set_children_replaces() {
        let mut parent = http("parent");
        parent.add_child(http("a"));
        parent.set_children(vec![http("b"), http("c")]);

        let tokens: Vec<&str> = parent.children().iter().map(|c| c.token()).collect();
        assert_eq!(tokens, vec!["b", "c"]);
    }

    #[test]
    fn test_data_access() {
        let mut profile = http("abc123");
        assert!(!profile.has("memory"));
        assert!(matches!(
            profile.get("memory"),
            Err(ProfilerError::ProfileDataNotFound(name)) if name == "memory"
        ));

        profile.add("memory", ProfileData::new(json!({"memory": 1024})));
        assert!(profile.has("memory"));
        assert_eq!(
            profile.payload("memory").unwrap().value(),
            &json!({"memory": 1024})
        );

        profile.add("memory", ProfileData::new(json!({"memory": 2048})));
        assert_eq!(profile.data().len(), 1);
        assert_eq!(
            profile.payload("memory").unwrap().value(),
            &json!({"memory": 2048})
        );
    }

    #[test]
    fn test_pending_entry_counts_as_present() {
        let mut profile = http("abc123");
        profile.add_pending("time", None);

        assert!(profile.has("time"));
        assert!(profile.get("time").unwrap().is_pending());
        assert!(profile.payload("time").is_none());
        assert_eq!(profile.pending_names(), vec!["time".to_string()]);
    }

    #[test]
    fn test_variant_accessors() {
        let profile = http("abc123");
        assert_eq!(profile.ip(), Some("127.0.0.1"));
        assert_eq!(profile.status_code(), Some(200));
        assert_eq!(profile.command(), None);
        assert_eq!(profile.kind().discriminator(), "http");

        let mut args = Map::new();
        args.insert("command".to_string(), json!("cache:clear"));
        let console = Profile::console("c1", "cache:clear", args, Map::new(), 1).unwrap();
        assert_eq!(console.command(), Some("cache:clear"));
        assert_eq!(console.exit_code(), Some(1));
        assert_eq!(console.ip(), None);
        assert_eq!(console.kind().discriminator(), "console");
    }
}
