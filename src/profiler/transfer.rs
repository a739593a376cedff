//! Export and import of whole profile trees.
//!
//! The snapshot covers the profile, its payloads and its full subtree. The
//! parent is carried by token only. Pending entries survive as names. The
//! blob is base64 JSON and is not meant to be stable across versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::encoding::{decode_blob, encode_blob};
use crate::errors::Result;
use crate::profile::{DataEntry, Profile, ProfileData, ProfileKind};

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    token: String,
    time: i64,
    kind: ProfileKind,
    parent_token: Option<String>,
    data: BTreeMap<String, SnapshotEntry>,
    children: Vec<Snapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "state", content = "payload", rename_all = "snake_case")]
enum SnapshotEntry {
    Resolved(ProfileData),
    /// Still waiting for a late collector.
    Pending,
}

impl Snapshot {
    fn capture(profile: &Profile) -> Self {
        Self {
            token: profile.token().to_string(),
            time: profile.time(),
            kind: profile.kind().clone(),
            parent_token: profile.parent_token().map(str::to_string),
            data: profile
                .data()
                .iter()
                .map(|(name, entry)| {
                    let entry = match entry {
                        DataEntry::Resolved(payload) => SnapshotEntry::Resolved(payload.clone()),
                        DataEntry::Pending(_) => SnapshotEntry::Pending,
                    };
                    (name.clone(), entry)
                })
                .collect(),
            children: profile.children().iter().map(Snapshot::capture).collect(),
        }
    }

    fn restore(self) -> Result<Profile> {
        let mut profile = Profile::new(self.token, self.kind)?.with_time(self.time);
        profile.set_parent_token(self.parent_token);
        for (name, entry) in self.data {
            match entry {
                SnapshotEntry::Resolved(payload) => profile.add(&name, payload),
                SnapshotEntry::Pending => profile.add_pending(&name, None),
            }
        }
        for child in self.children {
            profile.add_child(child.restore()?);
        }
        Ok(profile)
    }
}

/// Serialize a profile tree into an opaque blob.
pub fn export_profile(profile: &Profile) -> Result<String> {
    encode_blob(&Snapshot::capture(profile))
}

/// Rebuild a profile tree from a blob written by [`export_profile`].
pub fn import_profile(blob: &str) -> Result<Profile> {
    decode_blob::<Snapshot>(blob)?.restore()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProfilerError;
    use serde_json::json;

    #[test]
    fn test_tree_survives_export() {
        let mut parent = Profile::http("parent", Some("127.0.0.1"), Some("/"), Some("GET"), Some(200))
            .unwrap()
            .with_time(1_400_000_000);
        parent.add("request", ProfileData::new(json!({"route": "home"})));
        parent.add_pending("time", None);
        parent.add_child(Profile::http("child", None, Some("/_fragment"), None, None).unwrap());

        let restored = import_profile(&export_profile(&parent).unwrap()).unwrap();

        assert_eq!(restored, parent);
        assert_eq!(restored.children()[0].parent_token(), Some("parent"));
        assert!(matches!(restored.get("time").unwrap(), DataEntry::Pending(None)));
    }

    #[test]
    fn test_garbage_blob() {
        assert!(matches!(
            import_profile("not a blob"),
            Err(ProfilerError::Decode(_))
        ));
    }
}
