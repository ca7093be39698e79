//! Remote document service client
//!
//! Serves the document store, endpoint lookup and resource access from one
//! REST service:
//!
//! - `GET {base}{link}` fetches a document, 404 means absent
//! - `PUT {base}{link}` creates or replaces it
//! - `GET {base}{prefix}?field=value&...` queries a collection and answers
//!   `{"documentLinks": [...], "documents": {link: doc}}`; when `documents`
//!   is left out the links are fetched one by one, concurrently

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use url::Url;

use super::http::HttpClient;
use crate::error::{Error, Result};
use crate::resource::{Endpoint, EndpointLookup, ResourceAccess, ResourceState};
use crate::store::{with_self_link, DocumentStore, FieldMatch};

#[derive(Clone)]
pub struct RemoteStore {
    base: Url,
    http: HttpClient,
}

impl RemoteStore {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid store URL {}", base_url))?;
        if base.cannot_be_a_base() {
            return Err(Error::invalid_argument(format!(
                "store URL {} cannot be used as a base",
                base_url
            )));
        }
        Ok(Self {
            base,
            http: HttpClient::new(timeout, token)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of a document link, keeping any path prefix of the base URL
    pub fn document_url(&self, link: &str) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        let link = link.trim_start_matches('/');
        format!("{}/{}", base, link)
    }

    fn query_url(&self, prefix: &str, fields: &[FieldMatch]) -> String {
        let mut url = self.document_url(prefix);
        for (i, field) in fields.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&urlencoding::encode(&field.field));
            url.push('=');
            url.push_str(&urlencoding::encode(&field.value));
        }
        url
    }
}

#[async_trait]
impl DocumentStore for RemoteStore {
    async fn put(&self, link: &str, document: Value) -> Result<Value> {
        let document = with_self_link(document, link);
        Ok(self.http.put(&self.document_url(link), &document).await?)
    }

    async fn get(&self, link: &str) -> Result<Option<Value>> {
        Ok(self.http.get(&self.document_url(link)).await?)
    }

    async fn query_by_fields(&self, prefix: &str, fields: &[FieldMatch]) -> Result<Vec<Value>> {
        let url = self.query_url(prefix, fields);
        let Some(response) = self.http.get(&url).await? else {
            return Ok(Vec::new());
        };

        let links: Vec<String> = response
            .get("documentLinks")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let docs = match response.get("documents").and_then(|v| v.as_object()) {
            Some(documents) => links
                .iter()
                .filter_map(|link| documents.get(link).cloned())
                .collect(),
            None => {
                let fetched = try_join_all(links.iter().map(|link| self.get(link))).await?;
                fetched.into_iter().flatten().collect::<Vec<_>>()
            }
        };

        // the service may not filter; enforce the constraints locally
        let docs: Vec<Value> = docs
            .into_iter()
            .filter(|doc| fields.iter().all(|f| f.matches(doc)))
            .collect();

        tracing::debug!("remote query {} -> {} documents", url, docs.len());
        Ok(docs)
    }
}

#[async_trait]
impl EndpointLookup for RemoteStore {
    async fn endpoint_type(&self, endpoint_link: &str) -> Result<Option<String>> {
        match self.get(endpoint_link).await? {
            Some(doc) => {
                let endpoint: Endpoint = serde_json::from_value(doc)?;
                Ok(Some(endpoint.endpoint_type))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ResourceAccess for RemoteStore {
    async fn resource_state(&self, reference: &str) -> Result<Option<ResourceState>> {
        match self.get(reference).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }
}
