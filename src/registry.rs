//! Operation Registry
//!
//! Idempotent upsert of operation specs into the document store. The storage
//! key is derived from the spec's identity, so registering the same
//! `(endpoint_type, resource_type, operation)` twice replaces the first entry
//! instead of adding a second one. Re-registration with different non-key
//! fields is last-write-wins.

use std::sync::Arc;

use chrono::Utc;

use crate::criteria::Criteria;
use crate::error::Result;
use crate::spec::{self_link_for, ResourceOperationSpec};
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct OperationRegistry {
    store: Arc<dyn DocumentStore>,
}

impl OperationRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Validate, stamp identity and upsert. Returns the stored spec.
    pub async fn register(&self, spec: ResourceOperationSpec) -> Result<ResourceOperationSpec> {
        spec.validate()?;

        let identity = spec.computed_identity();
        let link = self_link_for(&identity);

        if let Some(criteria) = spec.target_criteria.as_deref() {
            if let Err(err) = Criteria::parse(criteria) {
                tracing::warn!(
                    "spec {}/{}/{} registered with criteria that will not evaluate: {}",
                    spec.endpoint_type,
                    spec.resource_type,
                    spec.operation,
                    err
                );
            }
        }

        if let Some(existing) = self.store.get(&link).await? {
            match serde_json::from_value::<ResourceOperationSpec>(existing) {
                Ok(existing) if !existing.same_content(&spec) => {
                    tracing::warn!("overwriting spec {} with changed content", link);
                }
                Ok(_) => tracing::debug!("re-registering unchanged spec {}", link),
                Err(e) => tracing::warn!("replacing unreadable spec document {}: {}", link, e),
            }
        }

        let mut spec = spec;
        spec.identity = Some(identity);
        spec.document_self_link = Some(link.clone());
        spec.document_update_time = Some(Utc::now());

        let stored = self.store.put(&link, serde_json::to_value(&spec)?).await?;
        let stored: ResourceOperationSpec = serde_json::from_value(stored)?;

        tracing::info!(
            "registered operation {} for {}/{} at {}",
            stored.operation,
            stored.endpoint_type,
            stored.resource_type,
            link
        );

        Ok(stored)
    }

    /// Register every spec, stopping at the first failure
    pub async fn register_all<I>(&self, specs: I) -> Result<Vec<ResourceOperationSpec>>
    where
        I: IntoIterator<Item = ResourceOperationSpec>,
    {
        let mut stored = Vec::new();
        for spec in specs {
            stored.push(self.register(spec).await?);
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::spec::{FACTORY_LINK, ResourceType};
    use crate::store::MemoryStore;

    fn registry() -> (OperationRegistry, MemoryStore) {
        let store = MemoryStore::new();
        (OperationRegistry::new(Arc::new(store.clone())), store)
    }

    fn reboot() -> ResourceOperationSpec {
        ResourceOperationSpec::new("aws", ResourceType::Compute, "reboot")
            .with_name("Reboot")
            .with_adapter_reference("http://adapters/aws/reboot")
    }

    #[tokio::test]
    async fn test_register_stamps_identity() {
        let (registry, _) = registry();
        let stored = registry.register(reboot()).await.unwrap();

        let identity = stored.identity.clone().unwrap();
        assert_eq!(identity, reboot().computed_identity());
        assert_eq!(
            stored.document_self_link.as_deref(),
            Some(format!("{}/{}", FACTORY_LINK, identity).as_str())
        );
        assert!(stored.document_update_time.is_some());
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (registry, store) = registry();
        let first = registry.register(reboot()).await.unwrap();
        let second = registry.register(reboot()).await.unwrap();

        assert_eq!(first.identity, second.identity);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (registry, store) = registry();
        registry.register(reboot()).await.unwrap();
        let updated = registry
            .register(reboot().with_description("now with grace period"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let link = updated.document_self_link.unwrap();
        let doc = store.get(&link).await.unwrap().unwrap();
        assert_eq!(doc["description"], "now with grace period");
    }

    #[tokio::test]
    async fn test_register_accepts_matching_identity() {
        let (registry, _) = registry();
        let mut spec = reboot();
        spec.identity = Some(spec.computed_identity());
        assert!(registry.register(spec).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid() {
        let (registry, store) = registry();

        let mut spec = reboot();
        spec.adapter_reference = None;
        assert!(matches!(registry.register(spec).await, Err(Error::Validation(_))));

        let mut spec = reboot();
        spec.identity = Some("not-the-identity".to_string());
        assert!(matches!(registry.register(spec).await, Err(Error::Validation(_))));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_malformed_criteria_still_registers() {
        let (registry, _) = registry();
        let stored = registry
            .register(reboot().with_target_criteria("resource.cpuCount =="))
            .await
            .unwrap();
        assert_eq!(stored.target_criteria.as_deref(), Some("resource.cpuCount =="));
    }

    #[tokio::test]
    async fn test_register_all() {
        let (registry, store) = registry();
        let specs = vec![
            reboot(),
            ResourceOperationSpec::new("aws", ResourceType::Compute, "resize")
                .with_adapter_reference("http://adapters/aws/resize"),
        ];
        let stored = registry.register_all(specs).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(store.len().await, 2);
    }
}
