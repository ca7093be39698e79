//! Extension Codec
//!
//! Extensions are typed metadata blobs attached to a spec under an arbitrary
//! key. Each blob is a JSON object whose first field is the `kind`
//! discriminator of its concrete type, followed by the type's own fields:
//!
//! ```text
//! {"kind":"opreg:ext:ui-hints","icon":"power","order":3}
//! ```
//!
//! The registry never looks inside. Callers that understand a kind decode it
//! with [`decode`], or build an [`ExtensionDispatcher`] to route payloads by
//! discriminator without knowing the type up front.

mod dispatch;

pub use dispatch::{Decoded, ExtensionDispatcher};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// Field name of the discriminator inside an encoded payload
pub const KIND_FIELD: &str = "kind";

/// A concrete extension type
///
/// `KIND` must be unique per type and must never change once payloads of
/// that type have been stored.
pub trait Extension: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

#[derive(Serialize)]
struct Tagged<'a, T: Serialize> {
    kind: &'a str,
    #[serde(flatten)]
    value: &'a T,
}

#[derive(Deserialize)]
struct KindOnly {
    kind: Option<String>,
}

/// Encode an extension value with its discriminator in front
pub fn encode<T: Extension>(value: &T) -> Result<String, CodecError> {
    match serde_json::to_value(value)? {
        Value::Object(ref map) if !map.contains_key(KIND_FIELD) => {}
        Value::Object(_) => {
            return Err(CodecError::KindMismatch {
                expected: T::KIND.to_string(),
                found: "payload field named kind".to_string(),
            })
        }
        _ => return Err(CodecError::NotAnObject),
    }

    let tagged = Tagged {
        kind: T::KIND,
        value,
    };
    Ok(serde_json::to_string(&tagged)?)
}

/// Read the discriminator without decoding the rest of the payload
pub fn peek_kind(encoded: &str) -> Result<String, CodecError> {
    let peek: KindOnly = serde_json::from_str(encoded).map_err(|e| {
        if e.is_data() {
            CodecError::NotAnObject
        } else {
            CodecError::Json(e)
        }
    })?;
    peek.kind
        .filter(|k| !k.is_empty())
        .ok_or(CodecError::MissingKind)
}

/// Decode a payload as `T`, checking its discriminator first
pub fn decode<T: Extension>(encoded: &str) -> Result<T, CodecError> {
    let mut value: Value = serde_json::from_str(encoded)?;
    let map = value.as_object_mut().ok_or(CodecError::NotAnObject)?;

    let kind = match map.remove(KIND_FIELD) {
        Some(Value::String(kind)) => kind,
        _ => return Err(CodecError::MissingKind),
    };
    if kind != T::KIND {
        return Err(CodecError::KindMismatch {
            expected: T::KIND.to_string(),
            found: kind,
        });
    }

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct UiHints {
        icon: String,
        order: u32,
        hidden: bool,
    }

    impl Extension for UiHints {
        const KIND: &'static str = "opreg:ext:ui-hints";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CostEstimate {
        currency: String,
        hourly: f64,
        breakdown: BTreeMap<String, f64>,
        notes: Option<String>,
    }

    impl Extension for CostEstimate {
        const KIND: &'static str = "opreg:ext:cost-estimate";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct NotAStruct(u32);

    impl Extension for NotAStruct {
        const KIND: &'static str = "opreg:ext:bare";
    }

    fn hints() -> UiHints {
        UiHints {
            icon: "power".to_string(),
            order: 3,
            hidden: false,
        }
    }

    #[test]
    fn test_encode_puts_kind_first() {
        let encoded = encode(&hints()).unwrap();
        assert!(encoded.starts_with("{\"kind\":\"opreg:ext:ui-hints\""));
    }

    #[test]
    fn test_decode_restores_fields() {
        let cost = CostEstimate {
            currency: "USD".to_string(),
            hourly: 0.125,
            breakdown: BTreeMap::from([("cpu".to_string(), 0.1), ("disk".to_string(), 0.025)]),
            notes: None,
        };
        let encoded = encode(&cost).unwrap();
        assert_eq!(decode::<CostEstimate>(&encoded).unwrap(), cost);
    }

    #[test]
    fn test_peek_kind() {
        let encoded = encode(&hints()).unwrap();
        assert_eq!(peek_kind(&encoded).unwrap(), UiHints::KIND);
        assert!(matches!(peek_kind("{\"icon\":\"x\"}"), Err(CodecError::MissingKind)));
        assert!(matches!(peek_kind("[1,2]"), Err(CodecError::NotAnObject)));
        assert!(matches!(peek_kind("{not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_decode_wrong_kind() {
        let encoded = encode(&hints()).unwrap();
        let err = decode::<CostEstimate>(&encoded).unwrap_err();
        assert!(matches!(err, CodecError::KindMismatch { ref found, .. } if found == UiHints::KIND));
    }

    #[test]
    fn test_encode_rejects_non_object() {
        assert!(matches!(encode(&NotAStruct(1)), Err(CodecError::NotAnObject)));
    }
}
