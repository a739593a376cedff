//! Encoder contract and registry.
//!
//! Encoders turn a typed profile into a flat `EncodedRecord` and back. The
//! storage layer keeps an ordered registry and dispatches on the record's
//! kind discriminator.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{ProfilerError, Result};
use crate::profile::{Profile, ProfileData};

use super::console::ConsoleProfileEncoder;
use super::http::HttpProfileEncoder;
use super::record::{decode_blob, encode_blob, EncodedRecord};

/// Fields every encoder indexes.
pub const BASE_INDEXES: &[&str] = &["token", "parent_token", "time"];

pub trait ProfileEncoder: Send + Sync {
    /// Whether this encoder handles records of `kind`.
    fn supports(&self, kind: &str) -> bool;

    fn encode(&self, profile: &Profile) -> Result<EncodedRecord>;

    /// Rebuild a profile from a record. Children are not attached here.
    fn decode(&self, record: &EncodedRecord) -> Result<Profile>;

    /// Record fields a backend should index for criteria search.
    fn indexes(&self) -> Vec<&'static str>;
}

/// Build the kind-independent part of a record.
pub fn encode_common(
    profile: &Profile,
    fields: serde_json::Map<String, serde_json::Value>,
) -> Result<EncodedRecord> {
    let data: BTreeMap<&str, &ProfileData> = profile
        .data()
        .iter()
        .filter_map(|(name, entry)| entry.payload().map(|p| (name.as_str(), p)))
        .collect();

    let pending = profile.pending_names();
    let collectors = if pending.is_empty() {
        None
    } else {
        Some(encode_blob(&pending)?)
    };

    Ok(EncodedRecord {
        kind: profile.kind().discriminator().to_string(),
        token: profile.token().to_string(),
        parent_token: profile.parent_token().map(str::to_string),
        children: profile
            .children()
            .iter()
            .map(|child| child.token().to_string())
            .collect(),
        time: profile.time(),
        data: encode_blob(&data)?,
        collectors,
        fields,
    })
}

/// Restore payloads, detached pending entries and the parent token.
pub fn decode_common(mut profile: Profile, record: &EncodedRecord) -> Result<Profile> {
    let data: BTreeMap<String, ProfileData> = decode_blob(&record.data)?;
    profile.set_data(data);

    if let Some(blob) = &record.collectors {
        let pending: Vec<String> = decode_blob(blob)?;
        for name in pending {
            profile.add_pending(&name, None);
        }
    }

    profile.set_parent_token(record.parent_token.clone());
    Ok(profile.with_time(record.time))
}

/// Ordered list of encoders; the first supporting encoder wins.
#[derive(Clone)]
pub struct EncoderRegistry {
    encoders: Vec<Arc<dyn ProfileEncoder>>,
}

impl EncoderRegistry {
    /// A registry with no encoders.
    pub fn empty() -> Self {
        Self {
            encoders: Vec::new(),
        }
    }

    pub fn add(&mut self, encoder: Arc<dyn ProfileEncoder>) {
        self.encoders.push(encoder);
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    pub fn resolve(&self, kind: &str) -> Result<&dyn ProfileEncoder> {
        self.encoders
            .iter()
            .find(|encoder| encoder.supports(kind))
            .map(|encoder| encoder.as_ref())
            .ok_or_else(|| ProfilerError::NoEncoderFound(kind.to_string()))
    }
}

impl Default for EncoderRegistry {
    /// HTTP and console encoders.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.add(Arc::new(HttpProfileEncoder));
        registry.add(Arc::new(ConsoleProfileEncoder));
        registry
    }
}
