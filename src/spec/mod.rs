//! Spec Model
//!
//! The capability descriptor adapters register, and the identity function
//! that every registration and lookup path shares.
//!
//! # Identity
//!
//! A spec is keyed by `(endpoint_type, resource_type, operation)`. The key is
//! hashed into a UUIDv5 by [`identity_of`]; the registry stores the spec under
//! [`self_link_for`] of that identity, so re-registering the same triple always
//! lands on the same document.

mod schema;

pub use schema::{DataType, FieldSchema, OperationSchema};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::extension::{self, Extension};

/// Collection all specs live under
pub const FACTORY_LINK: &str = "/resources/resource-operations";

/// Namespace for spec identities. Changing it re-keys every stored spec.
const IDENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6f70_7265_672d_4f50_8000_7265_736f_7572);

/// Separator between key fields, cannot appear in any sane endpoint type
const KEY_SEPARATOR: char = '\u{1f}';

/// Kind of managed resource an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Compute,
    Network,
    Subnet,
    Disk,
    Storage,
    LoadBalancer,
    SecurityGroup,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        Self::Compute,
        Self::Network,
        Self::Subnet,
        Self::Disk,
        Self::Storage,
        Self::LoadBalancer,
        Self::SecurityGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "COMPUTE",
            Self::Network => "NETWORK",
            Self::Subnet => "SUBNET",
            Self::Disk => "DISK",
            Self::Storage => "STORAGE",
            Self::LoadBalancer => "LOAD_BALANCER",
            Self::SecurityGroup => "SECURITY_GROUP",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| Error::validation(format!("unknown resource type: {}", s)))
    }
}

/// Compute the identity of a spec key. Pure and deterministic.
pub fn identity_of(endpoint_type: &str, resource_type: ResourceType, operation: &str) -> String {
    let key = format!(
        "{}{sep}{}{sep}{}",
        endpoint_type,
        resource_type.as_str(),
        operation,
        sep = KEY_SEPARATOR
    );
    Uuid::new_v5(&IDENTITY_NAMESPACE, key.as_bytes())
        .hyphenated()
        .to_string()
}

/// Storage key for an identity
pub fn self_link_for(identity: &str) -> String {
    format!("{}/{}", FACTORY_LINK, identity)
}

/// A registered, optionally conditional, operation on a kind of resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOperationSpec {
    pub endpoint_type: String,
    pub resource_type: ResourceType,
    pub operation: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Where the operation is executed once selected. Opaque to the registry.
    #[serde(default)]
    pub adapter_reference: Option<String>,
    /// Availability predicate; absent means always available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<OperationSchema>,
    /// Encoded extension payloads, stored verbatim
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_update_time: Option<DateTime<Utc>>,
}

impl ResourceOperationSpec {
    pub fn new(endpoint_type: &str, resource_type: ResourceType, operation: &str) -> Self {
        Self {
            endpoint_type: endpoint_type.to_string(),
            resource_type,
            operation: operation.to_string(),
            name: operation.to_string(),
            description: String::new(),
            adapter_reference: None,
            target_criteria: None,
            schema: None,
            extensions: BTreeMap::new(),
            identity: None,
            document_self_link: None,
            document_update_time: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_adapter_reference(mut self, reference: &str) -> Self {
        self.adapter_reference = Some(reference.to_string());
        self
    }

    pub fn with_target_criteria(mut self, criteria: &str) -> Self {
        self.target_criteria = Some(criteria.to_string());
        self
    }

    pub fn with_schema(mut self, schema: OperationSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Identity derived from the key fields
    pub fn computed_identity(&self) -> String {
        identity_of(&self.endpoint_type, self.resource_type, &self.operation)
    }

    /// Check required fields and any caller-supplied identity
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_type.trim().is_empty() {
            return Err(Error::validation("endpointType is required"));
        }
        if self.operation.trim().is_empty() {
            return Err(Error::validation("operation is required"));
        }
        match self.adapter_reference.as_deref().map(str::trim) {
            None | Some("") => return Err(Error::validation("adapterReference is required")),
            Some(reference) => {
                url::Url::parse(reference)
                    .or_else(|_| url::Url::parse("http://localhost").and_then(|base| base.join(reference)))
                    .map_err(|e| Error::validation(format!("adapterReference is not a URI: {}", e)))?;
            }
        }

        let computed = self.computed_identity();
        if let Some(supplied) = self.identity.as_deref() {
            if supplied != computed {
                return Err(Error::validation(format!(
                    "identity {} does not match computed identity {}",
                    supplied, computed
                )));
            }
        }
        if let Some(link) = self.document_self_link.as_deref() {
            if link != self_link_for(&computed) {
                return Err(Error::validation(format!(
                    "documentSelfLink {} does not match computed link {}",
                    link,
                    self_link_for(&computed)
                )));
            }
        }
        Ok(())
    }

    /// True when a non-empty target criteria is set
    pub fn has_criteria(&self) -> bool {
        self.target_criteria
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    /// Encode `value` and store it under `key`, replacing any previous payload
    pub fn put_extension<T: Extension>(&mut self, key: &str, value: &T) -> Result<()> {
        let encoded = extension::encode(value)?;
        self.extensions.insert(key.to_string(), encoded);
        Ok(())
    }

    /// Decode the payload under `key` as `T`; `None` when the key is absent
    pub fn extension<T: Extension>(&self, key: &str) -> Option<Result<T>> {
        self.extensions
            .get(key)
            .map(|raw| extension::decode::<T>(raw).map_err(Error::from))
    }

    /// Discriminator of the payload under `key`
    pub fn extension_kind(&self, key: &str) -> Option<Result<String>> {
        self.extensions
            .get(key)
            .map(|raw| extension::peek_kind(raw).map_err(Error::from))
    }

    /// True when both specs describe the same registration, ignoring
    /// store-stamped metadata
    pub fn same_content(&self, other: &Self) -> bool {
        self.endpoint_type == other.endpoint_type
            && self.resource_type == other.resource_type
            && self.operation == other.operation
            && self.name == other.name
            && self.description == other.description
            && self.adapter_reference == other.adapter_reference
            && self.target_criteria == other.target_criteria
            && self.schema == other.schema
            && self.extensions == other.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResourceOperationSpec {
        ResourceOperationSpec::new("aws", ResourceType::Compute, "reboot")
            .with_adapter_reference("http://adapters/aws/reboot")
    }

    #[test]
    fn test_identity_is_deterministic() {
        let a = identity_of("aws", ResourceType::Compute, "reboot");
        let b = identity_of("aws", ResourceType::Compute, "reboot");
        assert_eq!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_identity_separates_fields() {
        let a = identity_of("aws", ResourceType::Compute, "x-y");
        let b = identity_of("aws-x", ResourceType::Compute, "y");
        assert_ne!(a, b);
        assert_ne!(
            identity_of("aws", ResourceType::Compute, "reboot"),
            identity_of("aws", ResourceType::Network, "reboot")
        );
    }

    #[test]
    fn test_resource_type_round_trip() {
        for t in ResourceType::ALL {
            assert_eq!(t.as_str().parse::<ResourceType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        assert_eq!("load-balancer".parse::<ResourceType>().unwrap(), ResourceType::LoadBalancer);
        assert!("QUANTUM".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(sample().validate().is_ok());

        let mut spec = sample();
        spec.endpoint_type.clear();
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));

        let mut spec = sample();
        spec.operation = "  ".to_string();
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));

        let mut spec = sample();
        spec.adapter_reference = None;
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_relative_adapter_reference_is_accepted() {
        let spec = ResourceOperationSpec::new("aws", ResourceType::Compute, "reboot")
            .with_adapter_reference("/adapters/aws/reboot");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_foreign_identity() {
        let mut spec = sample();
        spec.identity = Some(identity_of("aws", ResourceType::Compute, "resize"));
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));

        spec.identity = Some(spec.computed_identity());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_camel_case_json() {
        let spec = sample().with_target_criteria("true");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["endpointType"], "aws");
        assert_eq!(json["resourceType"], "COMPUTE");
        assert_eq!(json["adapterReference"], "http://adapters/aws/reboot");
        assert_eq!(json["targetCriteria"], "true");
        assert!(json.get("schema").is_none());
    }

    #[test]
    fn test_has_criteria() {
        assert!(!sample().has_criteria());
        assert!(!sample().with_target_criteria("   ").has_criteria());
        assert!(sample().with_target_criteria("false").has_criteria());
    }
}
