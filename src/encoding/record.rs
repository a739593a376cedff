//! Storage representation of profiles.
//!
//! An `EncodedRecord` is the flat record written to a backend. An
//! `IndexEntry` is the subset of its fields a backend indexes and returns
//! from criteria searches.

use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ProfilerError, Result};

/// Flat record with reserved keys plus kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedRecord {
    #[serde(rename = "_class")]
    pub kind: String,
    pub token: String,
    pub parent_token: Option<String>,
    /// Child tokens; the children themselves are stored as separate records.
    pub children: Vec<String>,
    pub time: i64,
    /// Base64 blob of the resolved payloads.
    pub data: String,
    /// Base64 blob of the names still waiting for a late collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collectors: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EncodedRecord {
    /// The record as one flat JSON object.
    pub fn to_flat(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ProfilerError::Decode(format!(
                "record encoded to non-object: {}",
                other
            ))),
        }
    }

    pub fn from_flat(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| ProfilerError::Decode(format!("record: {}", e)))
    }

    /// Project the record onto the given indexed field names.
    pub fn indexed(&self, indexes: &[&str]) -> Result<IndexEntry> {
        let flat = self.to_flat()?;
        let entry = flat
            .into_iter()
            .filter(|(key, _)| indexes.contains(&key.as_str()))
            .collect();
        Ok(IndexEntry(entry))
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }
}

/// Indexed fields of one stored profile, as returned by `find_by`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexEntry(Map<String, Value>);

impl IndexEntry {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn token(&self) -> &str {
        self.get_str("token").unwrap_or_default()
    }

    pub fn time(&self) -> i64 {
        self.get_i64("time").unwrap_or_default()
    }

    pub fn parent_token(&self) -> Option<&str> {
        self.get_str("parent_token")
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.0.get(field).and_then(Value::as_i64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

/// Serialize a value into an opaque base64 blob.
pub fn encode_blob<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

/// Decode a blob written by `encode_blob`.
pub fn decode_blob<T: DeserializeOwned>(blob: &str) -> Result<T> {
    let bytes = general_purpose::STANDARD
        .decode(blob)
        .map_err(|e| ProfilerError::Decode(format!("blob: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| ProfilerError::Decode(format!("blob: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EncodedRecord {
        let mut fields = Map::new();
        fields.insert("ip".to_string(), json!("127.0.0.1"));
        fields.insert("status_code".to_string(), json!(200));
        EncodedRecord {
            kind: "http".to_string(),
            token: "abc123".to_string(),
            parent_token: None,
            children: vec!["def456".to_string()],
            time: 1_400_000_000,
            data: encode_blob(&json!({})).unwrap(),
            collectors: None,
            fields,
        }
    }

    #[test]
    fn test_flat_shape() {
        let flat = sample().to_flat().unwrap();
        assert_eq!(flat["_class"], json!("http"));
        assert_eq!(flat["ip"], json!("127.0.0.1"));
        assert_eq!(flat["parent_token"], Value::Null);
        assert!(!flat.contains_key("collectors"));
        assert!(!flat.contains_key("fields"));

        let back = EncodedRecord::from_flat(flat).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_indexed_projection() {
        let entry = sample()
            .indexed(&["token", "parent_token", "time", "ip", "status_code", "url"])
            .unwrap();
        assert_eq!(entry.token(), "abc123");
        assert_eq!(entry.time(), 1_400_000_000);
        assert_eq!(entry.get_i64("status_code"), Some(200));
        assert!(entry.get("data").is_none());
        // Absent fields are not invented.
        assert!(entry.get("url").is_none());
    }

    #[test]
    fn test_bad_blob_is_decode_error() {
        assert!(matches!(
            decode_blob::<Vec<String>>("!!not base64!!"),
            Err(ProfilerError::Decode(_))
        ));
        let not_json = general_purpose::STANDARD.encode(b"{");
        assert!(matches!(
            decode_blob::<Vec<String>>(&not_json),
            Err(ProfilerError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_reserved_key_rejected() {
        let mut flat = sample().to_flat().unwrap();
        flat.remove("token");
        assert!(EncodedRecord::from_flat(flat).is_err());
    }
}
