//! In-memory document store

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{is_under, with_self_link, DocumentStore, FieldMatch};
use crate::error::{Error, Result};

/// Documents ordered by self link, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_documents(docs: BTreeMap<String, Value>) -> Self {
        Self {
            docs: Arc::new(RwLock::new(docs)),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    pub(crate) async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.docs.read().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, link: &str, document: Value) -> Result<Value> {
        if !document.is_object() {
            return Err(Error::invalid_argument(format!(
                "document for {} must be a JSON object",
                link
            )));
        }
        let document = with_self_link(document, link);
        tracing::debug!("memory store put {}", link);
        self.docs
            .write()
            .await
            .insert(link.to_string(), document.clone());
        Ok(document)
    }

    async fn get(&self, link: &str) -> Result<Option<Value>> {
        Ok(self.docs.read().await.get(link).cloned())
    }

    async fn query_by_fields(&self, prefix: &str, fields: &[FieldMatch]) -> Result<Vec<Value>> {
        let docs = self.docs.read().await;
        let found: Vec<Value> = docs
            .iter()
            .filter(|(link, _)| is_under(link, prefix))
            .filter(|(_, doc)| fields.iter().all(|f| f.matches(doc)))
            .map(|(_, doc)| doc.clone())
            .collect();
        tracing::debug!("memory store query {} {:?} -> {} documents", prefix, fields, found.len());
        Ok(found)
    }
}
