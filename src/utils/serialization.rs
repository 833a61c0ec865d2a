// src/utils/serialization.rs
//! QR payload codec for gate credentials.
//!
//! Maps a [`GateCredential`] to and from the compact JSON text carried by the
//! QR code. Only structure is checked here; freshness and signature validity
//! are the verifier's concern.

use crate::models::credential::GateCredential;
use serde_json::{Map, Value};
use thiserror::Error;

/// Wire field names, in the order they are checked on decode.
const FIELD_TARGET: &str = "addr";
const FIELD_SUBJECT: &str = "usr";
const FIELD_SIGNATURE: &str = "sig";
const FIELD_ISSUED_AT: &str = "ts";

/// Errors raised while encoding or decoding a QR payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload is not a well-formed credential object: {0}")]
    MalformedPayload(String),

    #[error("payload is missing field `{0}`")]
    MissingField(&'static str),
}

/// Serializes a credential to its QR text.
///
/// # Errors
/// - `MissingField` if any string field is empty
pub fn encode_credential(credential: &GateCredential) -> Result<String, CodecError> {
    for (name, value) in [
        (FIELD_TARGET, &credential.target_context),
        (FIELD_SUBJECT, &credential.subject_address),
        (FIELD_SIGNATURE, &credential.signature),
    ] {
        if value.trim().is_empty() {
            return Err(CodecError::MissingField(name));
        }
    }

    serde_json::to_string(credential).map_err(|e| CodecError::MalformedPayload(e.to_string()))
}

/// Parses QR text into a credential.
///
/// # Errors
/// - `MalformedPayload` if the text is not a JSON object, or `ts` is not an integer
/// - `MissingField` if any of `addr`, `usr`, `sig`, `ts` is absent, `null` or empty
pub fn decode_credential(text: &str) -> Result<GateCredential, CodecError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| CodecError::MalformedPayload("expected a JSON object".to_string()))?;

    let target_context = required_string(object, FIELD_TARGET)?;
    let subject_address = required_string(object, FIELD_SUBJECT)?;
    let signature = required_string(object, FIELD_SIGNATURE)?;
    let issued_at_millis = match object.get(FIELD_ISSUED_AT) {
        None | Some(Value::Null) => return Err(CodecError::MissingField(FIELD_ISSUED_AT)),
        Some(ts) => ts.as_i64().ok_or_else(|| {
            CodecError::MalformedPayload(format!("`{}` must be an integer, got {}", FIELD_ISSUED_AT, ts))
        })?,
    };

    Ok(GateCredential {
        target_context,
        subject_address,
        signature,
        issued_at_millis,
    })
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, CodecError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(CodecError::MissingField(field)),
        Some(Value::String(s)) if s.is_empty() => Err(CodecError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(CodecError::MalformedPayload(format!(
            "`{}` must be a string, got {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> GateCredential {
        GateCredential {
            target_context: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
            subject_address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            signature: format!("0x{}", "ab".repeat(65)),
            issued_at_millis: 1_733_000_000_123,
        }
    }

    #[test]
    fn test_round_trip_preserves_credential() {
        let original = credential();
        let text = encode_credential(&original).unwrap();
        assert_eq!(decode_credential(&text).unwrap(), original);
    }

    #[test]
    fn test_encode_uses_short_wire_names() {
        let text = encode_credential(&credential()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        for key in ["addr", "usr", "sig", "ts"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_encode_rejects_empty_signature() {
        let mut c = credential();
        c.signature.clear();
        assert_eq!(encode_credential(&c), Err(CodecError::MissingField("sig")));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            decode_credential("https://example.com/not-a-ticket"),
            Err(CodecError::MalformedPayload(_))
        ));
        assert!(matches!(decode_credential("[1,2,3]"), Err(CodecError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_reports_first_missing_field() {
        assert_eq!(
            decode_credential(r#"{"usr":"0x1","sig":"0x2","ts":1}"#),
            Err(CodecError::MissingField("addr"))
        );
        assert_eq!(
            decode_credential(r#"{"addr":"0x1","usr":"","sig":"0x2","ts":1}"#),
            Err(CodecError::MissingField("usr"))
        );
        assert_eq!(
            decode_credential(r#"{"addr":"0x1","usr":"0x2","sig":null,"ts":1}"#),
            Err(CodecError::MissingField("sig"))
        );
        assert_eq!(
            decode_credential(r#"{"addr":"0x1","usr":"0x2","sig":"0x3"}"#),
            Err(CodecError::MissingField("ts"))
        );
    }

    #[test]
    fn test_decode_rejects_string_timestamp() {
        assert!(matches!(
            decode_credential(r#"{"addr":"0x1","usr":"0x2","sig":"0x3","ts":"123"}"#),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let decoded =
            decode_credential(r#"{"addr":"0x1","usr":"0x2","sig":"0x3","ts":7,"v":2}"#).unwrap();
        assert_eq!(decoded.issued_at_millis, 7);
    }
}
