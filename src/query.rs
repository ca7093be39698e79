//! Query Facade
//!
//! Answers "which operations apply to this resource": fetch the resource,
//! collect the specs registered for its endpoint type and kind, keep the ones
//! whose criteria hold.

use std::sync::Arc;

use crate::criteria::is_available;
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::resource::ResourceAccess;
use crate::spec::ResourceOperationSpec;

#[derive(Clone)]
pub struct OperationQuery {
    resolver: Resolver,
    resources: Arc<dyn ResourceAccess>,
}

impl OperationQuery {
    pub fn new(resolver: Resolver, resources: Arc<dyn ResourceAccess>) -> Self {
        Self {
            resolver,
            resources,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Specs currently available for the resource at `reference`. An unknown
    /// resource has no operations.
    pub async fn operations_for(&self, reference: &str) -> Result<Vec<ResourceOperationSpec>> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::invalid_argument("resource reference is required"));
        }

        let Some(state) = self.resources.resource_state(reference).await? else {
            tracing::debug!("resource {} not found, no operations", reference);
            return Ok(Vec::new());
        };

        let candidates = self.resolver.all_for_resource(&state).await?;
        let total = candidates.len();

        let mut available = Vec::with_capacity(total);
        for spec in candidates {
            if is_available(Some(&state), Some(&spec))? {
                available.push(spec);
            }
        }

        tracing::debug!(
            "{} of {} operations available for {}",
            available.len(),
            total,
            reference
        );
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OperationRegistry;
    use crate::resource::{Endpoint, ResourceState, StoreCollaborators};
    use crate::spec::ResourceType;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn setup() -> (OperationRegistry, OperationQuery, StoreCollaborators<MemoryStore>) {
        let store = MemoryStore::new();
        let collaborators = StoreCollaborators::new(store.clone());
        let shared = Arc::new(collaborators.clone());
        let resolver = Resolver::new(Arc::new(store.clone()), shared.clone());
        let query = OperationQuery::new(resolver, shared);

        collaborators
            .put_endpoint(&Endpoint::new("/resources/endpoints/e1", "aws"))
            .await
            .unwrap();
        collaborators
            .put_resource(
                &ResourceState::new("/resources/compute/vm-1", ResourceType::Compute)
                    .with_endpoint("/resources/endpoints/e1")
                    .with_attribute("cpuCount", json!(2)),
            )
            .await
            .unwrap();

        (OperationRegistry::new(Arc::new(store)), query, collaborators)
    }

    fn spec(operation: &str) -> ResourceOperationSpec {
        ResourceOperationSpec::new("aws", ResourceType::Compute, operation)
            .with_adapter_reference(&format!("/adapters/aws/{}", operation))
    }

    #[tokio::test]
    async fn test_missing_reference_is_invalid() {
        let (_, query, _) = setup().await;
        assert!(matches!(query.operations_for("").await, Err(Error::InvalidArgument(_))));
        assert!(matches!(query.operations_for("  ").await, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_unknown_resource_has_no_operations() {
        let (registry, query, _) = setup().await;
        registry.register(spec("reboot")).await.unwrap();
        assert!(query
            .operations_for("/resources/compute/ghost")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_filters_by_criteria() {
        let (registry, query, _) = setup().await;
        registry.register(spec("reboot")).await.unwrap();
        registry
            .register(spec("scale-down").with_target_criteria("resource.cpuCount > 2"))
            .await
            .unwrap();
        registry
            .register(spec("scale-up").with_target_criteria("resource.cpuCount <= 2"))
            .await
            .unwrap();

        let ops = query.operations_for("/resources/compute/vm-1").await.unwrap();
        let mut names: Vec<_> = ops.iter().map(|s| s.operation.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["reboot", "scale-up"]);
    }

    #[tokio::test]
    async fn test_malformed_criteria_propagates() {
        let (registry, query, _) = setup().await;
        registry
            .register(spec("broken").with_target_criteria("resource.cpuCount =="))
            .await
            .unwrap();
        assert!(matches!(
            query.operations_for("/resources/compute/vm-1").await,
            Err(Error::Evaluation(_))
        ));
    }
}
