//! Collaborator entities
//!
//! Endpoints and resource states are owned by other services. This crate only
//! reads them, through [`EndpointLookup`] and [`ResourceAccess`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::spec::ResourceType;
use crate::store::DocumentStore;

/// Collection endpoints are stored under
pub const ENDPOINTS_LINK: &str = "/resources/endpoints";

/// A configured account on some cloud provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(rename = "documentSelfLink")]
    pub self_link: String,
    pub endpoint_type: String,
    #[serde(default)]
    pub name: String,
}

impl Endpoint {
    pub fn new(self_link: &str, endpoint_type: &str) -> Self {
        Self {
            self_link: self_link.to_string(),
            endpoint_type: endpoint_type.to_string(),
            name: String::new(),
        }
    }
}

/// A managed resource as seen by predicates: a kind, an owning endpoint and
/// an open attribute bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    #[serde(rename = "documentSelfLink", default)]
    pub self_link: String,
    #[serde(rename = "resourceType")]
    pub kind: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_link: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ResourceState {
    pub fn new(self_link: &str, kind: ResourceType) -> Self {
        Self {
            self_link: self_link.to_string(),
            kind,
            endpoint_link: None,
            attributes: Map::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint_link: &str) -> Self {
        self.endpoint_link = Some(endpoint_link.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Follow a dotted path through the attribute bag
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.attributes.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Owned JSON view of the whole state, as predicates see it
    pub fn snapshot(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("documentSelfLink".to_string(), Value::String(self.self_link.clone()));
        map.insert(
            "resourceType".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        if let Some(ref link) = self.endpoint_link {
            map.insert("endpointLink".to_string(), Value::String(link.clone()));
        }
        Value::Object(map)
    }
}

/// Resolves an endpoint link to its endpoint type
#[async_trait]
pub trait EndpointLookup: Send + Sync {
    async fn endpoint_type(&self, endpoint_link: &str) -> Result<Option<String>>;
}

/// Fetches the current state of a resource
#[async_trait]
pub trait ResourceAccess: Send + Sync {
    async fn resource_state(&self, reference: &str) -> Result<Option<ResourceState>>;
}

/// Both collaborators served from the same document store
#[derive(Debug, Clone)]
pub struct StoreCollaborators<S> {
    store: S,
}

impl<S: DocumentStore> StoreCollaborators<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Store an endpoint document
    pub async fn put_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        self.store
            .put(&endpoint.self_link, serde_json::to_value(endpoint)?)
            .await?;
        Ok(())
    }

    /// Store a resource state document
    pub async fn put_resource(&self, state: &ResourceState) -> Result<()> {
        self.store
            .put(&state.self_link, serde_json::to_value(state)?)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<S: DocumentStore> EndpointLookup for StoreCollaborators<S> {
    async fn endpoint_type(&self, endpoint_link: &str) -> Result<Option<String>> {
        let Some(doc) = self.store.get(endpoint_link).await? else {
            tracing::debug!("endpoint {} not found", endpoint_link);
            return Ok(None);
        };
        let endpoint: Endpoint = serde_json::from_value(doc)?;
        Ok(Some(endpoint.endpoint_type))
    }
}

#[async_trait]
impl<S: DocumentStore> ResourceAccess for StoreCollaborators<S> {
    async fn resource_state(&self, reference: &str) -> Result<Option<ResourceState>> {
        let Some(doc) = self.store.get(reference).await? else {
            tracing::debug!("resource {} not found", reference);
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc)?))
    }
}
