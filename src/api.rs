//! JSON entry points
//!
//! Thin JSON-in/JSON-out wrappers over the registry and the query facade, for
//! transports that speak documents rather than Rust types. Errors carry an
//! HTTP-style status through [`Error::status_code`].

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::query::OperationQuery;
use crate::registry::OperationRegistry;
use crate::remote::format_http_error;
use crate::spec::ResourceOperationSpec;

/// Query parameter naming the resource to list operations for
pub const RESOURCE_PARAM: &str = "resource";

/// Longest user-facing error message
const MAX_MESSAGE_LENGTH: usize = 120;

/// Register the spec document in `payload`, returning the stored document
pub async fn register_json(registry: &OperationRegistry, payload: &str) -> Result<Value> {
    let spec: ResourceOperationSpec = serde_json::from_str(payload)
        .map_err(|e| Error::validation(format!("malformed spec document: {}", e)))?;
    let stored = registry.register(spec).await?;
    Ok(serde_json::to_value(stored)?)
}

/// Operations available for `params["resource"]`, as a JSON array of spec
/// documents in resolver order
pub async fn query_json(query: &OperationQuery, params: &HashMap<String, String>) -> Result<Value> {
    let reference = params
        .get(RESOURCE_PARAM)
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| {
            Error::invalid_argument(format!("'{}' query parameter is required", RESOURCE_PARAM))
        })?;

    let specs = query.operations_for(reference).await?;
    let documents = specs
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Value::Array(documents))
}

/// Format an error for display to an end user
pub fn format_error(error: &Error) -> String {
    let message = match error {
        Error::Store(inner) => return format_http_error(inner),
        other => other.to_string(),
    };

    let sanitized = message
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_MESSAGE_LENGTH)
        .collect::<String>();

    if sanitized.chars().count() < message.chars().count() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

/// Error body for transports: `{"statusCode": .., "message": ..}`
pub fn error_body(error: &Error) -> Value {
    json!({
        "statusCode": error.status_code(),
        "message": format_error(error),
    })
}
