//! Document store
//!
//! The registry delegates durability to a document store keyed by self link.
//! Consistency is whatever the backend provides: a `put` is not guaranteed to
//! be visible to a concurrent reader elsewhere.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process map, ordered by self link
//! - [`FileStore`] - [`MemoryStore`] persisted to a JSON file
//! - [`crate::remote::RemoteStore`] - REST document service

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Field carrying a document's storage key
pub const SELF_LINK_FIELD: &str = "documentSelfLink";

/// Equality constraint on a top-level document field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: String,
    pub value: String,
}

impl FieldMatch {
    pub fn new(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// Strings compare as-is, other scalars by their JSON text
    pub fn matches(&self, document: &Value) -> bool {
        match document.get(&self.field) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            Some(Value::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace the document at `link`, returning what was stored
    async fn put(&self, link: &str, document: Value) -> Result<Value>;

    async fn get(&self, link: &str) -> Result<Option<Value>>;

    /// All documents under `prefix` matching every constraint. The order is
    /// stable for a given store state.
    async fn query_by_fields(&self, prefix: &str, fields: &[FieldMatch]) -> Result<Vec<Value>>;
}

/// Stamp the self link into a document before it is stored
pub(crate) fn with_self_link(mut document: Value, link: &str) -> Value {
    if let Value::Object(ref mut map) = document {
        map.insert(SELF_LINK_FIELD.to_string(), Value::String(link.to_string()));
    }
    document
}

/// True when `link` lives directly or transitively under `prefix`
pub(crate) fn is_under(link: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || link
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}
