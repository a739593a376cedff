//! HTTP profile encoder.

use serde_json::{json, Map, Value};

use crate::errors::{ProfilerError, Result};
use crate::profile::{HttpDetails, Profile, ProfileKind};

use super::encoder::{decode_common, encode_common, ProfileEncoder, BASE_INDEXES};
use super::record::EncodedRecord;

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProfileEncoder;

impl ProfileEncoder for HttpProfileEncoder {
    fn supports(&self, kind: &str) -> bool {
        kind == ProfileKind::HTTP
    }

    fn encode(&self, profile: &Profile) -> Result<EncodedRecord> {
        let http = match profile.kind() {
            ProfileKind::Http(http) => http,
            other => {
                return Err(ProfilerError::NoEncoderFound(
                    other.discriminator().to_string(),
                ))
            }
        };

        let mut fields = Map::new();
        fields.insert("ip".to_string(), json!(http.ip));
        fields.insert("url".to_string(), json!(http.url));
        fields.insert("method".to_string(), json!(http.method));
        fields.insert("status_code".to_string(), json!(http.status_code));

        encode_common(profile, fields)
    }

    fn decode(&self, record: &EncodedRecord) -> Result<Profile> {
        let status_code = match record.fields.get("status_code") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|code| u16::try_from(code).ok())
                    .ok_or_else(|| {
                        ProfilerError::Decode(format!("invalid status_code {}", value))
                    })?,
            ),
        };

        let details = HttpDetails {
            ip: record.field_str("ip").map(str::to_string),
            url: record.field_str("url").map(str::to_string),
            method: record.field_str("method").map(str::to_string),
            status_code,
        };

        let profile = Profile::new(record.token.clone(), ProfileKind::Http(details))?;
        decode_common(profile, record)
    }

    fn indexes(&self) -> Vec<&'static str> {
        let mut indexes = BASE_INDEXES.to_vec();
        indexes.extend(["ip", "url", "method", "status_code"]);
        indexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileData;

    #[test]
    fn test_encode_fields() {
        let mut profile = Profile::http(
            "abc123",
            Some("127.0.0.1"),
            Some("http://example.com/"),
            Some("GET"),
            Some(200),
        )
        .unwrap()
        .with_time(1_400_000_000);
        profile.add_child(Profile::http("child1", None, None, Some("GET"), None).unwrap());

        let record = HttpProfileEncoder.encode(&profile).unwrap();
        assert_eq!(record.kind, "http");
        assert_eq!(record.children, vec!["child1".to_string()]);
        assert_eq!(record.field_str("url"), Some("http://example.com/"));
        assert_eq!(record.field_i64("status_code"), Some(200));
        assert!(record.collectors.is_none());
    }

    #[test]
    fn test_round_trip() {
        let mut profile =
            Profile::http("abc123", Some("::1"), None, Some("POST"), Some(302)).unwrap();
        profile.add("router", ProfileData::new(json!({"route": "login"})));
        profile.add_pending("time", None);

        let record = HttpProfileEncoder.encode(&profile).unwrap();
        assert!(record.collectors.is_some());

        let decoded = HttpProfileEncoder.decode(&record).unwrap();
        assert_eq!(decoded, profile);
        assert!(decoded.get("time").unwrap().is_pending());
    }

    #[test]
    fn test_rejects_console_profile() {
        let profile = Profile::console("abc123", "list", Map::new(), Map::new(), 0).unwrap();
        assert!(HttpProfileEncoder.encode(&profile).is_err());
    }

    #[test]
    fn test_corrupt_data_blob() {
        let profile = Profile::http("abc123", None, None, None, None).unwrap();
        let mut record = HttpProfileEncoder.encode(&profile).unwrap();
        record.data = "%%%".to_string();
        assert!(matches!(
            HttpProfileEncoder.decode(&record),
            Err(ProfilerError::Decode(_))
        ));
    }

    #[test]
    fn test_indexes() {
        let indexes = HttpProfileEncoder.indexes();
        for field in ["token", "parent_token", "time", "ip", "url", "method", "status_code"] {
            assert!(indexes.contains(&field), "missing {}", field);
        }
    }
}
