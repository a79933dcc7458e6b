//! Collection-oriented document backend used by `DocumentStore`.
//!
//! # Responsibility
//! - Describe the minimal surface a managed document database offers:
//!   keyed get, create-if-absent, revision-checked replace, equality/range
//!   queries and counts.
//! - Provide `MemoryDocumentBackend`, an in-process implementation for
//!   development and tests.
//!
//! # Invariants
//! - Every successful write bumps the document revision by one.
//! - `replace` only succeeds when the caller saw the current revision.
//! - Query results come back in document creation order.
//! - There are no multi-document transactions.

use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type BackendResult<T> = Result<T, BackendError>;

/// Failure reported by a document backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// `create` found an existing document with the same id.
    AlreadyExists { collection: String, id: String },
    /// `replace` target does not exist.
    Missing { collection: String, id: String },
    /// `replace` saw a newer revision than the caller expected.
    RevisionMismatch {
        collection: String,
        id: String,
        expected: u64,
        actual: u64,
    },
    /// Transport-level failure (timeout, unavailable, quota, ...).
    Unavailable(String),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists { collection, id } => {
                write!(f, "document already exists: {collection}/{id}")
            }
            Self::Missing { collection, id } => write!(f, "document missing: {collection}/{id}"),
            Self::RevisionMismatch {
                collection,
                id,
                expected,
                actual,
            } => write!(
                f,
                "revision mismatch on {collection}/{id}: expected {expected}, found {actual}"
            ),
            Self::Unavailable(message) => write!(f, "document backend unavailable: {message}"),
        }
    }
}

impl Error for BackendError {}

/// Stored document with its optimistic-concurrency revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub revision: u64,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lte,
    Gt,
}

/// Single-field predicate. Range operators compare numbers only.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Self {
            field,
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn lte(field: &'static str, value: impl Into<Value>) -> Self {
        Self {
            field,
            op: FilterOp::Lte,
            value: value.into(),
        }
    }

    pub fn gt(field: &'static str, value: impl Into<Value>) -> Self {
        Self {
            field,
            op: FilterOp::Gt,
            value: value.into(),
        }
    }

    /// Returns whether `data` satisfies this predicate.
    pub fn matches(&self, data: &Value) -> bool {
        let Some(actual) = data.get(self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Lte => compare_numbers(actual, &self.value)
                .map_or(false, |ordering| ordering != Ordering::Greater),
            FilterOp::Gt => compare_numbers(actual, &self.value)
                .map_or(false, |ordering| ordering == Ordering::Greater),
        }
    }
}

/// Minimal document database surface.
pub trait DocumentBackend: Send + Sync {
    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Document>>;
    /// Creates a document; fails with `AlreadyExists` if the id is taken.
    fn create(&self, collection: &str, id: &str, data: Value) -> BackendResult<Document>;
    /// Replaces a document only if its revision still equals `expected_revision`.
    fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_revision: u64,
        data: Value,
    ) -> BackendResult<Document>;
    /// Physically removes a document. Used for compensation and resets.
    fn remove(&self, collection: &str, id: &str) -> BackendResult<bool>;
    fn query(&self, collection: &str, filters: &[Filter]) -> BackendResult<Vec<Document>>;
    fn count(&self, collection: &str, filters: &[Filter]) -> BackendResult<usize> {
        Ok(self.query(collection, filters)?.len())
    }
}

impl<T: DocumentBackend + ?Sized> DocumentBackend for Arc<T> {
    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Document>> {
        (**self).get(collection, id)
    }

    fn create(&self, collection: &str, id: &str, data: Value) -> BackendResult<Document> {
        (**self).create(collection, id, data)
    }

    fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_revision: u64,
        data: Value,
    ) -> BackendResult<Document> {
        (**self).replace(collection, id, expected_revision, data)
    }

    fn remove(&self, collection: &str, id: &str) -> BackendResult<bool> {
        (**self).remove(collection, id)
    }

    fn query(&self, collection: &str, filters: &[Filter]) -> BackendResult<Vec<Document>> {
        (**self).query(collection, filters)
    }

    fn count(&self, collection: &str, filters: &[Filter]) -> BackendResult<usize> {
        (**self).count(collection, filters)
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    revision: u64,
    data: Value,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_seq: u64,
    collections: HashMap<String, HashMap<String, StoredDocument>>,
}

/// In-process document backend.
///
/// Writes are linearizable per document, which matches the read-your-own-write
/// guarantee the managed store gives the writing node.
#[derive(Debug, Default)]
pub struct MemoryDocumentBackend {
    state: RwLock<MemoryState>,
}

impl MemoryDocumentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents (tombstoned included) in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Drops every collection.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.collections.clear();
    }
}

impl DocumentBackend for MemoryDocumentBackend {
    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Document>> {
        let state = self.state.read();
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|stored| Document {
                id: id.to_string(),
                revision: stored.revision,
                data: stored.data.clone(),
            }))
    }

    fn create(&self, collection: &str, id: &str, data: Value) -> BackendResult<Document> {
        let mut state = self.state.write();
        state.next_seq += 1;
        let seq = state.next_seq;
        let docs = state.collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(BackendError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        docs.insert(
            id.to_string(),
            StoredDocument {
                seq,
                revision: 1,
                data: data.clone(),
            },
        );
        Ok(Document {
            id: id.to_string(),
            revision: 1,
            data,
        })
    }

    fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_revision: u64,
        data: Value,
    ) -> BackendResult<Document> {
        let mut state = self.state.write();
        let stored = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| BackendError::Missing {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        if stored.revision != expected_revision {
            return Err(BackendError::RevisionMismatch {
                collection: collection.to_string(),
                id: id.to_string(),
                expected: expected_revision,
                actual: stored.revision,
            });
        }

        stored.revision += 1;
        stored.data = data.clone();
        Ok(Document {
            id: id.to_string(),
            revision: stored.revision,
            data,
        })
    }

    fn remove(&self, collection: &str, id: &str) -> BackendResult<bool> {
        let mut state = self.state.write();
        Ok(state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    fn query(&self, collection: &str, filters: &[Filter]) -> BackendResult<Vec<Document>> {
        let state = self.state.read();
        let Some(docs) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(u64, Document)> = docs
            .iter()
            .filter(|(_, stored)| filters.iter().all(|filter| filter.matches(&stored.data)))
            .map(|(id, stored)| {
                (
                    stored.seq,
                    Document {
                        id: id.clone(),
                        revision: stored.revision,
                        data: stored.data.clone(),
                    },
                )
            })
            .collect();
        matched.sort_by_key(|(seq, _)| *seq);
        Ok(matched.into_iter().map(|(_, doc)| doc).collect())
    }
}

fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.as_i64(), right.as_i64()) {
        (Some(left), Some(right)) => Some(left.cmp(&right)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}
