//! Resolver
//!
//! Read-only lookups from an endpoint type, an endpoint link or a resource
//! state to the specs registered for it. Every path computes the storage key
//! with [`identity_of`], the same function the registry uses.

use std::sync::Arc;

use crate::error::Result;
use crate::resource::{EndpointLookup, ResourceState};
use crate::spec::{identity_of, self_link_for, ResourceOperationSpec, ResourceType, FACTORY_LINK};
use crate::store::{DocumentStore, FieldMatch};

#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn DocumentStore>,
    endpoints: Arc<dyn EndpointLookup>,
}

impl Resolver {
    pub fn new(store: Arc<dyn DocumentStore>, endpoints: Arc<dyn EndpointLookup>) -> Self {
        Self { store, endpoints }
    }

    /// Direct lookup by key
    pub async fn by_endpoint_type(
        &self,
        endpoint_type: &str,
        resource_type: ResourceType,
        operation: &str,
    ) -> Result<Option<ResourceOperationSpec>> {
        let link = self_link_for(&identity_of(endpoint_type, resource_type, operation));
        tracing::debug!(
            "resolving {}/{}/{} at {}",
            endpoint_type,
            resource_type,
            operation,
            link
        );

        match self.store.get(&link).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Lookup through the endpoint's type. A missing endpoint is `None`.
    pub async fn by_endpoint_link(
        &self,
        endpoint_link: &str,
        resource_type: ResourceType,
        operation: &str,
    ) -> Result<Option<ResourceOperationSpec>> {
        let Some(endpoint_type) = self.endpoints.endpoint_type(endpoint_link).await? else {
            tracing::debug!("endpoint {} not found, no spec", endpoint_link);
            return Ok(None);
        };
        self.by_endpoint_type(&endpoint_type, resource_type, operation)
            .await
    }

    /// Every spec registered for the resource's endpoint type and kind,
    /// before availability filtering
    pub async fn all_for_resource(&self, state: &ResourceState) -> Result<Vec<ResourceOperationSpec>> {
        let Some(endpoint_link) = state.endpoint_link.as_deref() else {
            tracing::debug!("resource {} has no endpoint, no specs", state.self_link);
            return Ok(Vec::new());
        };
        let Some(endpoint_type) = self.endpoints.endpoint_type(endpoint_link).await? else {
            tracing::debug!(
                "endpoint {} of resource {} not found, no specs",
                endpoint_link,
                state.self_link
            );
            return Ok(Vec::new());
        };

        self.all_for(&endpoint_type, state.kind).await
    }

    /// Every spec registered for an endpoint type and resource kind
    pub async fn all_for(
        &self,
        endpoint_type: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<ResourceOperationSpec>> {
        let docs = self
            .store
            .query_by_fields(
                FACTORY_LINK,
                &[
                    FieldMatch::new("endpointType", endpoint_type),
                    FieldMatch::new("resourceType", resource_type.as_str()),
                ],
            )
            .await?;

        let specs = docs
            .into_iter()
            .map(serde_json::from_value::<ResourceOperationSpec>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(
            "{} specs registered for {}/{}",
            specs.len(),
            endpoint_type,
            resource_type
        );
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OperationRegistry;
    use crate::resource::{Endpoint, StoreCollaborators};
    use crate::store::MemoryStore;

    struct Fixture {
        registry: OperationRegistry,
        resolver: Resolver,
        collaborators: StoreCollaborators<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let collaborators = StoreCollaborators::new(store.clone());
        Fixture {
            registry: OperationRegistry::new(Arc::new(store.clone())),
            resolver: Resolver::new(Arc::new(store), Arc::new(collaborators.clone())),
            collaborators,
        }
    }

    fn spec(endpoint_type: &str, resource_type: ResourceType, operation: &str) -> ResourceOperationSpec {
        ResourceOperationSpec::new(endpoint_type, resource_type, operation)
            .with_adapter_reference(&format!("/adapters/{}/{}", endpoint_type, operation))
    }

    #[tokio::test]
    async fn test_by_endpoint_type() {
        let f = fixture();
        f.registry
            .register(spec("aws", ResourceType::Compute, "reboot"))
            .await
            .unwrap();

        let found = f
            .resolver
            .by_endpoint_type("aws", ResourceType::Compute, "reboot")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.operation, "reboot");

        assert!(f
            .resolver
            .by_endpoint_type("aws", ResourceType::Network, "reboot")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_by_endpoint_link() {
        let f = fixture();
        f.collaborators
            .put_endpoint(&Endpoint::new("/resources/endpoints/e1", "azure"))
            .await
            .unwrap();
        f.registry
            .register(spec("azure", ResourceType::Compute, "resize"))
            .await
            .unwrap();

        let found = f
            .resolver
            .by_endpoint_link("/resources/endpoints/e1", ResourceType::Compute, "resize")
            .await
            .unwrap();
        assert_eq!(found.unwrap().endpoint_type, "azure");

        let missing = f
            .resolver
            .by_endpoint_link("/resources/endpoints/nope", ResourceType::Compute, "resize")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_all_for_resource_scopes_by_type_and_kind() {
        let f = fixture();
        f.collaborators
            .put_endpoint(&Endpoint::new("/resources/endpoints/e1", "aws"))
            .await
            .unwrap();
        for s in [
            spec("aws", ResourceType::Compute, "reboot"),
            spec("aws", ResourceType::Compute, "resize"),
            spec("aws", ResourceType::Network, "attach"),
            spec("gcp", ResourceType::Compute, "reboot"),
        ] {
            f.registry.register(s).await.unwrap();
        }

        let vm = ResourceState::new("/resources/compute/vm", ResourceType::Compute)
            .with_endpoint("/resources/endpoints/e1");
        let found = f.resolver.all_for_resource(&vm).await.unwrap();
        let mut ops: Vec<_> = found.iter().map(|s| s.operation.as_str()).collect();
        ops.sort();
        assert_eq!(ops, vec!["reboot", "resize"]);
        assert!(found.iter().all(|s| s.endpoint_type == "aws"));

        let again = f.resolver.all_for_resource(&vm).await.unwrap();
        assert_eq!(found, again);
    }

    #[tokio::test]
    async fn test_all_for_resource_without_endpoint() {
        let f = fixture();
        let orphan = ResourceState::new("/resources/compute/vm", ResourceType::Compute);
        assert!(f.resolver.all_for_resource(&orphan).await.unwrap().is_empty());

        let dangling = orphan.with_endpoint("/resources/endpoints/deleted");
        assert!(f.resolver.all_for_resource(&dangling).await.unwrap().is_empty());
    }
}
