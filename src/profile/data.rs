//! Collector payloads attached to a profile.
//!
//! A payload is opaque to the profiler: collectors build it from any
//! serializable value and readers decode it back into their own types.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collectors::DataCollector;
use crate::errors::{ProfilerError, Result};

/// Opaque payload produced by a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileData(Value);

impl ProfileData {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Build a payload from any serializable collector output.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// Decode the payload into a typed collector output.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| ProfilerError::Decode(format!("profile data: {}", e)))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ProfileData {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One named entry of a profile's data map.
///
/// `Pending` entries belong to late collectors and are resolved when the
/// profile is saved. A pending entry decoded from storage has lost its
/// collector and can no longer be resolved.
#[derive(Clone)]
pub enum DataEntry {
    Resolved(ProfileData),
    Pending(Option<Arc<dyn DataCollector>>),
}

impl DataEntry {
    pub fn is_pending(&self) -> bool {
        matches!(self, DataEntry::Pending(_))
    }

    /// The payload, if this entry has been resolved.
    pub fn payload(&self) -> Option<&ProfileData> {
        match self {
            DataEntry::Resolved(data) => Some(data),
            DataEntry::Pending(_) => None,
        }
    }
}

impl fmt::Debug for DataEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataEntry::Resolved(data) => f.debug_tuple("Resolved").field(data).finish(),
            DataEntry::Pending(Some(collector)) => {
                f.debug_tuple("Pending").field(&collector.name()).finish()
            }
            DataEntry::Pending(None) => f.debug_tuple("Pending").field(&"detached").finish(),
        }
    }
}

impl PartialEq for DataEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataEntry::Resolved(a), DataEntry::Resolved(b)) => a == b,
            (DataEntry::Pending(_), DataEntry::Pending(_)) => true,
            _ => false,
        }
    }
}
