//! Document store storage.
//!
//! Each profile is one document: `_id` is the token, `indexed` holds the
//! index entry and `data` the full record. String criteria match
//! `indexed.<field>` by substring, numeric ones by equality. Documents whose
//! `indexed.time` is older than the lifetime are removed on write.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::encoding::{EncodedRecord, EncoderRegistry, IndexEntry, ProfileEncoder};
use crate::errors::{ProfilerError, Result};
use crate::logging::LogContext;

use super::criteria::{is_exact_field, Criteria};
use super::dsn::DocumentDsn;
use super::RecordStore;

/// Condition on one dotted document path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    Contains(String),
    Range { gte: Option<i64>, lt: Option<i64>, lte: Option<i64> },
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Condition::Equals(expected), Some(actual)) => expected == actual,
            (Condition::Contains(needle), Some(Value::String(s))) => s.contains(needle.as_str()),
            (Condition::Range { gte, lt, lte }, Some(actual)) => match actual.as_i64() {
                Some(n) => {
                    gte.map_or(true, |b| n >= b)
                        && lt.map_or(true, |b| n < b)
                        && lte.map_or(true, |b| n <= b)
                }
                None => false,
            },
            _ => false,
        }
    }
}

/// Conjunction of path conditions. Empty matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    conditions: Vec<(String, Condition)>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, path: &str, condition: Condition) -> Self {
        self.conditions.push((path.to_string(), condition));
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(path, condition)| condition.matches(lookup(document, path)))
    }
}

/// Resolve a dotted path such as `indexed.url`.
fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

/// Minimal collection contract of a document database.
pub trait DocumentCollection: Send + Sync {
    /// Insert or replace the document stored under `id`.
    fn upsert(&self, id: &str, document: Value) -> Result<bool>;

    fn find_one(&self, id: &str) -> Result<Option<Value>>;

    /// Matching documents sorted by `sort_path` descending, at most `limit`.
    fn find(&self, query: &DocumentQuery, sort_path: &str, limit: usize) -> Result<Vec<Value>>;

    /// Remove matching documents, returning how many went away.
    fn remove(&self, query: &DocumentQuery) -> Result<usize>;
}

/// In-process collection.
#[derive(Default)]
pub struct MemoryCollection {
    /// id -> (insertion sequence, document)
    documents: Mutex<BTreeMap<String, (u64, Value)>>,
    sequence: Mutex<u64>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentCollection for MemoryCollection {
    fn upsert(&self, id: &str, document: Value) -> Result<bool> {
        let mut documents = self.documents.lock();
        let seq = match documents.get(id) {
            Some((seq, _)) => *seq,
            None => {
                let mut sequence = self.sequence.lock();
                *sequence += 1;
                *sequence
            }
        };
        documents.insert(id.to_string(), (seq, document));
        Ok(true)
    }

    fn find_one(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.documents.lock().get(id).map(|(_, doc)| doc.clone()))
    }

    fn find(&self, query: &DocumentQuery, sort_path: &str, limit: usize) -> Result<Vec<Value>> {
        let documents = self.documents.lock();
        let mut found: Vec<&(u64, Value)> = documents
            .values()
            .filter(|(_, doc)| query.matches(doc))
            .collect();

        let key = |(seq, doc): &(u64, Value)| {
            (
                lookup(doc, sort_path).and_then(Value::as_i64).unwrap_or_default(),
                *seq,
            )
        };
        found.sort_by(|a, b| key(*b).cmp(&key(*a)));

        Ok(found
            .into_iter()
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    fn remove(&self, query: &DocumentQuery) -> Result<usize> {
        let mut documents = self.documents.lock();
        let before = documents.len();
        documents.retain(|_, (_, doc)| !query.matches(doc));
        Ok(before - documents.len())
    }
}

pub struct DocumentProfilerStorage<D: DocumentCollection> {
    collection: D,
    encoders: EncoderRegistry,
    /// Seconds a profile is kept; 0 keeps profiles forever.
    lifetime: u64,
}

impl DocumentProfilerStorage<MemoryCollection> {
    /// Storage over a fresh in-process collection.
    pub fn in_memory(lifetime: u64) -> Self {
        Self::with_collection(MemoryCollection::new(), lifetime)
    }
}

impl<D: DocumentCollection> DocumentProfilerStorage<D> {
    /// Validate `dsn` and wrap a collection already connected to it.
    pub fn new(dsn: &str, collection: D, lifetime: u64) -> Result<Self> {
        let dsn = DocumentDsn::parse(dsn)?;
        crate::log_info!(
            LogContext::new("document"),
            "DOCUMENT_STORAGE_CONFIGURED",
            server = dsn.server,
            database = dsn.database,
            collection = dsn.collection
        );
        Ok(Self::with_collection(collection, lifetime))
    }

    pub fn with_collection(collection: D, lifetime: u64) -> Self {
        Self {
            collection,
            encoders: EncoderRegistry::default(),
            lifetime,
        }
    }

    pub fn add_encoder(&mut self, encoder: Arc<dyn ProfileEncoder>) {
        self.encoders.add(encoder);
    }

    pub fn collection(&self) -> &D {
        &self.collection
    }

    /// Remove documents whose profile time is older than the lifetime.
    pub fn purge_expired(&self) -> Result<usize> {
        if self.lifetime == 0 {
            return Ok(0);
        }
        let lifetime = i64::try_from(self.lifetime).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp().saturating_sub(lifetime);
        self.collection.remove(&DocumentQuery::new().and(
            "indexed.time",
            Condition::Range {
                gte: None,
                lt: Some(cutoff),
                lte: None,
            },
        ))
    }

    fn build_query(
        criteria: &Criteria,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Option<DocumentQuery> {
        let mut query = DocumentQuery::new();
        for (field, value) in criteria.iter() {
            let path = format!("indexed.{}", field);
            let condition = if is_exact_field(field) {
                Condition::Equals(json!(value.parse::<i64>().ok()?))
            } else {
                Condition::Contains(value.to_string())
            };
            query = query.and(&path, condition);
        }
        if start.is_some() || end.is_some() {
            query = query.and(
                "indexed.time",
                Condition::Range {
                    gte: start,
                    lt: None,
                    lte: end,
                },
            );
        }
        Some(query)
    }
}

impl<D: DocumentCollection> RecordStore for DocumentProfilerStorage<D> {
    fn backend(&self) -> &'static str {
        "document"
    }

    fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    fn do_write(&self, record: &EncodedRecord, indexed: &IndexEntry) -> Result<bool> {
        let expired = self.purge_expired()?;
        if expired > 0 {
            crate::log_debug!(
                LogContext::new("document"),
                "EXPIRED_DOCUMENTS_REMOVED",
                count = expired
            );
        }

        let data: Map<String, Value> = record
            .to_flat()?
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();
        let indexed: Map<String, Value> = indexed
            .fields()
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let document = json!({
            "_id": record.token,
            "indexed": indexed,
            "data": data,
        });
        self.collection.upsert(&record.token, document)
    }

    fn do_read(&self, token: &str) -> Result<Option<EncodedRecord>> {
        let document = match self.collection.find_one(token)? {
            Some(document) => document,
            None => return Ok(None),
        };

        match document.get("data") {
            Some(Value::Object(data)) => EncodedRecord::from_flat(data.clone()).map(Some),
            _ => Err(ProfilerError::Decode(format!(
                "document {} has no data object",
                token
            ))),
        }
    }

    fn do_find(
        &self,
        criteria: &Criteria,
        limit: usize,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<IndexEntry>> {
        let query = match Self::build_query(criteria, start, end) {
            Some(query) => query,
            None => return Ok(Vec::new()),
        };

        let documents = self.collection.find(&query, "indexed.time", limit)?;
        Ok(documents
            .into_iter()
            .filter_map(|document| match document.get("indexed") {
                Some(Value::Object(fields)) => Some(IndexEntry::new(fields.clone())),
                _ => None,
            })
            .collect())
    }

    fn do_purge(&self) -> Result<()> {
        self.collection.remove(&DocumentQuery::new())?;
        Ok(())
    }
}
