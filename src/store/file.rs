//! File-backed document store
//!
//! Keeps every document in memory and rewrites a single JSON file on each
//! write. A write only becomes visible once the file holds it. Meant for the
//! CLI and single-process use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{with_self_link, DocumentStore, FieldMatch, MemoryStore};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Serializes writers so the file and memory agree
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let exists = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check store file {}", path.display()))?;

        let docs: BTreeMap<String, Value> = if exists {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read store file {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse store file {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("opened file store {:?} with {} documents", path, docs.len());

        Ok(Self {
            path,
            inner: MemoryStore::from_documents(docs),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, docs: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(docs)?;
        let tmp = self.path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to replace {}", self.path.display()))
                .into());
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn put(&self, link: &str, document: Value) -> Result<Value> {
        if !document.is_object() {
            return Err(Error::invalid_argument(format!(
                "document for {} must be a JSON object",
                link
            )));
        }

        // held across the file write and the commit
        let _guard = self.write_lock.lock().await;

        let mut docs = self.inner.snapshot().await;
        docs.insert(link.to_string(), with_self_link(document.clone(), link));
        self.persist(&docs).await?;

        self.inner.put(link, document).await
    }

    async fn get(&self, link: &str) -> Result<Option<Value>> {
        self.inner.get(link).await
    }

    async fn query_by_fields(&self, prefix: &str, fields: &[FieldMatch]) -> Result<Vec<Value>> {
        self.inner.query_by_fields(prefix, fields).await
    }
}
