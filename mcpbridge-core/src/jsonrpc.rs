//! JSON-RPC 2.0 message classification.
//!
//! Operates on an already-parsed `serde_json::Value`. Both the stdio relay
//! and the gateway adapter use it to decide whether a message is a request,
//! a response or a notification without re-implementing the rules.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// JSON-RPC request identifier.
///
/// Preserves the wire type so that echoed ids round-trip exactly:
/// `"id": 1` stays a number, `"id": "1"` stays a string. An explicit
/// `"id": null` is distinct from a missing id (which marks a notification).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JsonRpcId {
    /// Integer ID (e.g., `"id": 1`)
    Number(i64),
    /// Integer ID above `i64::MAX` (e.g., `"id": 18446744073709551615`)
    Unsigned(u64),
    /// String ID (e.g., `"id": "abc-123"`)
    String(String),
    /// Explicit null ID (e.g., `"id": null`)
    Null,
}

impl Serialize for JsonRpcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcId::Number(n) => serializer.serialize_i64(*n),
            JsonRpcId::Unsigned(n) => serializer.serialize_u64(*n),
            JsonRpcId::String(s) => serializer.serialize_str(s),
            JsonRpcId::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse_id(&value)
            .ok_or_else(|| serde::de::Error::custom("JSON-RPC ID must be string, integer, or null"))
    }
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::Unsigned(n) => write!(f, "{n}"),
            JsonRpcId::String(s) => write!(f, "\"{s}\""),
            JsonRpcId::Null => f.write_str("null"),
        }
    }
}

/// Classification of a JSON-RPC 2.0 message.
///
/// Determined by presence/absence of `id` and `method` fields:
/// - Request: has both `id` and `method`
/// - Response: has `id` but no `method`
/// - Notification: has `method` but no `id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonRpcMessageKind {
    /// Has both `id` and `method`: a request expecting a response.
    Request { id: JsonRpcId, method: String },
    /// Has `id` but no `method`: a response to a previous request.
    Response { id: JsonRpcId },
    /// Has `method` but no `id`: a fire-and-forget notification.
    Notification { method: String },
}

impl JsonRpcMessageKind {
    /// Method name, or `"response"` for responses.
    ///
    /// This is the key the monitoring counters use.
    pub fn method(&self) -> &str {
        match self {
            JsonRpcMessageKind::Request { method, .. } => method.as_str(),
            JsonRpcMessageKind::Notification { method } => method.as_str(),
            JsonRpcMessageKind::Response { .. } => "response",
        }
    }

    /// The id, for requests and responses.
    pub fn id(&self) -> Option<&JsonRpcId> {
        match self {
            JsonRpcMessageKind::Request { id, .. } | JsonRpcMessageKind::Response { id } => {
                Some(id)
            }
            JsonRpcMessageKind::Notification { .. } => None,
        }
    }

    /// Short label: `request`, `response` or `notification`.
    pub fn label(&self) -> &'static str {
        match self {
            JsonRpcMessageKind::Request { .. } => "request",
            JsonRpcMessageKind::Response { .. } => "response",
            JsonRpcMessageKind::Notification { .. } => "notification",
        }
    }
}

/// Classify a parsed JSON-RPC value without taking ownership.
///
/// # Errors
///
/// Returns [`JsonRpcClassifyError`] if:
/// - The `jsonrpc` field is missing or not `"2.0"` (`InvalidVersion`)
/// - The `id` field is present but not a valid JSON-RPC ID (`InvalidId`)
/// - Neither `id` nor `method` is present (`Unclassifiable`)
pub fn classify_jsonrpc(value: &Value) -> Result<JsonRpcMessageKind, JsonRpcClassifyError> {
    let version = value.get("jsonrpc").and_then(|v| v.as_str());
    if version != Some("2.0") {
        return Err(JsonRpcClassifyError::InvalidVersion);
    }

    let id = match value.get("id") {
        Some(raw) => Some(parse_id(raw).ok_or(JsonRpcClassifyError::InvalidId)?),
        None => None,
    };
    let method = value
        .get("method")
        .and_then(|v| v.as_str())
        .map(String::from);

    match (id, method) {
        (Some(id), Some(method)) => Ok(JsonRpcMessageKind::Request { id, method }),
        (Some(id), None) => Ok(JsonRpcMessageKind::Response { id }),
        (None, Some(method)) => Ok(JsonRpcMessageKind::Notification { method }),
        (None, None) => Err(JsonRpcClassifyError::Unclassifiable),
    }
}

/// Parse a JSON value into a `JsonRpcId`.
///
/// Accepts string, integer, or null. Rejects floats, booleans, arrays, objects.
pub fn parse_id(value: &Value) -> Option<JsonRpcId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(JsonRpcId::Number)
            .or_else(|| n.as_u64().map(JsonRpcId::Unsigned)),
        Value::String(s) => Some(JsonRpcId::String(s.clone())),
        Value::Null => Some(JsonRpcId::Null),
        _ => None,
    }
}

/// Errors that can occur during JSON-RPC message classification.
#[derive(Debug, thiserror::Error)]
pub enum JsonRpcClassifyError {
    /// The `jsonrpc` field is missing or not `"2.0"`.
    #[error("missing or invalid jsonrpc version field")]
    InvalidVersion,
    /// The `id` field is present but not a valid JSON-RPC ID.
    #[error("invalid id field")]
    InvalidId,
    /// The message has neither `id` nor `method`.
    #[error("message has neither id nor method")]
    Unclassifiable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_request() {
        let val = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {}});
        let kind = classify_jsonrpc(&val).unwrap();
        assert_eq!(
            kind,
            JsonRpcMessageKind::Request {
                id: JsonRpcId::Number(1),
                method: "tools/call".to_string()
            }
        );
        assert_eq!(kind.method(), "tools/call");
        assert_eq!(kind.label(), "request");
    }

    #[test]
    fn test_classify_response() {
        let val = json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        let kind = classify_jsonrpc(&val).unwrap();
        assert_eq!(
            kind,
            JsonRpcMessageKind::Response {
                id: JsonRpcId::Number(1)
            }
        );
        assert_eq!(kind.method(), "response");
    }

    #[test]
    fn test_classify_notification() {
        let val = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let kind = classify_jsonrpc(&val).unwrap();
        assert_eq!(kind.id(), None);
        assert_eq!(kind.label(), "notification");
    }

    #[test]
    fn test_classify_missing_version() {
        let val = json!({"id": 1, "method": "x"});
        let err = classify_jsonrpc(&val).unwrap_err();
        assert!(matches!(err, JsonRpcClassifyError::InvalidVersion));
    }

    #[test]
    fn test_classify_wrong_version() {
        let val = json!({"jsonrpc": "1.0", "id": 1, "method": "x"});
        let err = classify_jsonrpc(&val).unwrap_err();
        assert!(matches!(err, JsonRpcClassifyError::InvalidVersion));
    }

    #[test]
    fn test_classify_unclassifiable() {
        let val = json!({"jsonrpc": "2.0"});
        let err = classify_jsonrpc(&val).unwrap_err();
        assert!(matches!(err, JsonRpcClassifyError::Unclassifiable));
    }

    #[test]
    fn test_classify_string_and_null_ids() {
        let val = json!({"jsonrpc": "2.0", "id": "abc-123", "method": "ping"});
        assert_eq!(
            classify_jsonrpc(&val).unwrap().id(),
            Some(&JsonRpcId::String("abc-123".to_string()))
        );

        let val = json!({"jsonrpc": "2.0", "id": null, "result": "ok"});
        assert_eq!(
            classify_jsonrpc(&val).unwrap(),
            JsonRpcMessageKind::Response {
                id: JsonRpcId::Null
            }
        );
    }

    #[test]
    fn test_classify_invalid_id_type() {
        let val = json!({"jsonrpc": "2.0", "id": true, "method": "x"});
        let err = classify_jsonrpc(&val).unwrap_err();
        assert!(matches!(err, JsonRpcClassifyError::InvalidId));

        let val = json!({"jsonrpc": "2.0", "id": 1.5, "result": {}});
        let err = classify_jsonrpc(&val).unwrap_err();
        assert!(matches!(err, JsonRpcClassifyError::InvalidId));
    }

    #[test]
    fn test_ids_above_i64_max_are_kept() {
        let val: Value =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":18446744073709551615,"method":"ping"}"#)
                .unwrap();
        let kind = classify_jsonrpc(&val).unwrap();
        assert_eq!(kind.id(), Some(&JsonRpcId::Unsigned(u64::MAX)));
        assert_eq!(
            serde_json::to_string(kind.id().unwrap()).unwrap(),
            "18446744073709551615"
        );
        assert_eq!(JsonRpcId::Unsigned(u64::MAX).to_string(), "18446744073709551615");
    }

    #[test]
    fn test_id_serializes_with_wire_type() {
        assert_eq!(serde_json::to_string(&JsonRpcId::Number(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&JsonRpcId::String("7".into())).unwrap(),
            "\"7\""
        );
        assert_eq!(serde_json::to_string(&JsonRpcId::Null).unwrap(), "null");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(JsonRpcId::Number(5).to_string(), "5");
        assert_eq!(JsonRpcId::String("a".into()).to_string(), "\"a\"");
        assert_eq!(JsonRpcId::Null.to_string(), "null");
    }
}
