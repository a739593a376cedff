//! Console command profile encoder.
//!
//! Arguments and options are stored as blobs; only the command name and
//! exit code are indexed.

use serde_json::{json, Map, Value};

use crate::errors::{ProfilerError, Result};
use crate::profile::{ConsoleDetails, Profile, ProfileKind};

use super::encoder::{decode_common, encode_common, ProfileEncoder, BASE_INDEXES};
use super::record::{decode_blob, encode_blob, EncodedRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProfileEncoder;

impl ProfileEncoder for ConsoleProfileEncoder {
    fn supports(&self, kind: &str) -> bool {
        kind == ProfileKind::CONSOLE
    }

    fn encode(&self, profile: &Profile) -> Result<EncodedRecord> {
        let console = match profile.kind() {
            ProfileKind::Console(console) => console,
            other => {
                return Err(ProfilerError::NoEncoderFound(
                    other.discriminator().to_string(),
                ))
            }
        };

        let mut fields = Map::new();
        fields.insert("command".to_string(), json!(console.command));
        fields.insert("exit_code".to_string(), json!(console.exit_code));
        fields.insert(
            "arguments".to_string(),
            Value::String(encode_blob(&console.arguments)?),
        );
        fields.insert(
            "options".to_string(),
            Value::String(encode_blob(&console.options)?),
        );

        encode_common(profile, fields)
    }

    fn decode(&self, record: &EncodedRecord) -> Result<Profile> {
        let command = record
            .field_str("command")
            .ok_or_else(|| ProfilerError::Decode("console record without command".to_string()))?;
        let exit_code = record
            .field_i64("exit_code")
            .and_then(|code| i32::try_from(code).ok())
            .ok_or_else(|| ProfilerError::Decode("console record without exit_code".to_string()))?;

        let arguments: Map<String, Value> = match record.field_str("arguments") {
            Some(blob) => decode_blob(blob)?,
            None => Map::new(),
        };
        let options: Map<String, Value> = match record.field_str("options") {
            Some(blob) => decode_blob(blob)?,
            None => Map::new(),
        };

        let details = ConsoleDetails {
            command: command.to_string(),
            arguments,
            options,
            exit_code,
        };

        let profile = Profile::new(record.token.clone(), ProfileKind::Console(details))?;
        decode_common(profile, record)
    }

    fn indexes(&self) -> Vec<&'static str> {
        let mut indexes = BASE_INDEXES.to_vec();
        indexes.extend(["command", "exit_code"]);
        indexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileData;

    fn console_profile() -> Profile {
        let mut arguments = Map::new();
        arguments.insert("command".to_string(), json!("debug:test"));
        arguments.insert("name".to_string(), json!("world"));
        let mut options = Map::new();
        options.insert("verbose".to_string(), json!(true));

        Profile::console("con123", "debug:test", arguments, options, 1)
            .unwrap()
            .with_time(1_400_000_000)
    }

    #[test]
    fn test_round_trip() {
        let mut profile = console_profile();
        profile.add("memory", ProfileData::new(json!({"memory": 4096})));

        let record = ConsoleProfileEncoder.encode(&profile).unwrap();
        assert_eq!(record.kind, "console");
        assert_eq!(record.field_str("command"), Some("debug:test"));
        assert_eq!(record.field_i64("exit_code"), Some(1));

        let decoded = ConsoleProfileEncoder.decode(&record).unwrap();
        assert_eq!(decoded, profile);
        assert_eq!(decoded.arguments().unwrap()["name"], json!("world"));
    }

    #[test]
    fn test_indexes_skip_blobs() {
        let record = ConsoleProfileEncoder.encode(&console_profile()).unwrap();
        let entry = record.indexed(&ConsoleProfileEncoder.indexes()).unwrap();
        assert_eq!(entry.get_str("command"), Some("debug:test"));
        assert!(entry.get("arguments").is_none());
        assert!(entry.get("options").is_none());
    }

    #[test]
    fn test_missing_command() {
        let mut record = ConsoleProfileEncoder.encode(&console_profile()).unwrap();
        record.fields.remove("command");
        assert!(matches!(
            ConsoleProfileEncoder.decode(&record),
            Err(ProfilerError::Decode(_))
        ));
    }
}
