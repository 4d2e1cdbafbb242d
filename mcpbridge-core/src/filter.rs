//! Protocol filter: decides whether one line of child output may reach the
//! client's stdout.
//!
//! Parsing is best-effort and never fails: every line maps to a
//! [`ParsedLine`] variant, and [`classify_line`] turns that into a
//! [`LineDisposition`]. Only [`LineDisposition::Protocol`] lines are ever
//! written to stdout; everything else belongs on stderr.
//!
//! This module is pure: no I/O, no read loops.

use serde_json::Value;

use crate::jsonrpc::{JsonRpcMessageKind, classify_jsonrpc};

/// Result of a best-effort JSON parse of one line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// The line is a single JSON object.
    Object(Value),
    /// The line does not start with `{` (banners, log text, arrays).
    NotJson,
    /// The line starts with `{` but is not a complete JSON object.
    Malformed { reason: String },
}

/// Why a line was kept off stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignReason {
    NotJson,
    Malformed(String),
    /// Valid JSON object without `"jsonrpc":"2.0"` at the top level.
    NotJsonRpc,
}

impl ForeignReason {
    pub fn label(&self) -> &'static str {
        match self {
            ForeignReason::NotJson => "not_json",
            ForeignReason::Malformed(_) => "malformed_json",
            ForeignReason::NotJsonRpc => "not_jsonrpc",
        }
    }
}

/// A line admitted to the protocol stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolFrame {
    /// The line with surrounding whitespace (and its terminator) removed.
    pub line: String,
    /// The parsed object.
    pub value: Value,
    /// Request / response / notification, when the shape allows it.
    ///
    /// `None` for objects that carry `"jsonrpc":"2.0"` but have neither
    /// `id` nor `method`, or an id of the wrong type. Such frames are still
    /// forwarded; they just cannot be tracked.
    pub kind: Option<JsonRpcMessageKind>,
}

impl ProtocolFrame {
    /// A server-style request: has `method` and `id`, and no `result` or
    /// `error`.
    pub fn is_request(&self) -> bool {
        matches!(self.kind, Some(JsonRpcMessageKind::Request { .. }))
            && self.value.get("result").is_none()
            && self.value.get("error").is_none()
    }

    /// True for responses carrying an `error` member.
    pub fn has_error(&self) -> bool {
        self.value.get("error").is_some()
    }

    /// The line plus its NDJSON terminator, ready to write.
    pub fn to_ndjson(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.line.len() + 1);
        out.extend_from_slice(self.line.as_bytes());
        out.push(b'\n');
        out
    }
}

/// What the relay should do with one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineDisposition {
    /// Forward to the client's stdout.
    Protocol(ProtocolFrame),
    /// Divert to stderr, tagged with the server name.
    Foreign(ForeignReason),
    /// Whitespace only; dropped.
    Blank,
}

/// Parse one line without ever failing.
pub fn parse_line(line: &str) -> ParsedLine {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return ParsedLine::NotJson;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => ParsedLine::Object(value),
        Ok(_) => ParsedLine::Malformed {
            reason: "not a JSON object".to_string(),
        },
        Err(e) => ParsedLine::Malformed {
            reason: e.to_string(),
        },
    }
}

/// Classify a line of child output.
///
/// | parse result                        | disposition          |
/// |-------------------------------------|----------------------|
/// | whitespace only                     | `Blank`              |
/// | object with `"jsonrpc":"2.0"`       | `Protocol`           |
/// | object without it                   | `Foreign(NotJsonRpc)`|
/// | `{`-prefixed but unparseable        | `Foreign(Malformed)` |
/// | anything else                       | `Foreign(NotJson)`   |
pub fn classify_line(line: &str) -> LineDisposition {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineDisposition::Blank;
    }

    match parse_line(trimmed) {
        ParsedLine::Object(value) => {
            if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
                return LineDisposition::Foreign(ForeignReason::NotJsonRpc);
            }
            let kind = classify_jsonrpc(&value).ok();
            LineDisposition::Protocol(ProtocolFrame {
                line: trimmed.to_string(),
                value,
                kind,
            })
        }
        ParsedLine::NotJson => LineDisposition::Foreign(ForeignReason::NotJson),
        ParsedLine::Malformed { reason } => {
            LineDisposition::Foreign(ForeignReason::Malformed(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::JsonRpcId;

    fn frame(line: &str) -> ProtocolFrame {
        match classify_line(line) {
            LineDisposition::Protocol(frame) => frame,
            other => panic!("expected protocol frame for {line}, got {other:?}"),
        }
    }

    #[test]
    fn test_banner_is_foreign() {
        assert_eq!(
            classify_line("Secure Filesystem Server running on stdio"),
            LineDisposition::Foreign(ForeignReason::NotJson)
        );
    }

    #[test]
    fn test_response_is_protocol() {
        let f = frame("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
        assert_eq!(
            f.kind,
            Some(JsonRpcMessageKind::Response {
                id: JsonRpcId::Number(1)
            })
        );
        assert_eq!(f.line, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
        assert_eq!(f.to_ndjson(), b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }

    #[test]
    fn test_crlf_terminator_is_stripped() {
        let f = frame("{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\r\n");
        assert!(f.line.ends_with('}'));
    }

    #[test]
    fn test_blank_lines() {
        assert_eq!(classify_line(""), LineDisposition::Blank);
        assert_eq!(classify_line("   \r\n"), LineDisposition::Blank);
    }

    #[test]
    fn test_object_without_jsonrpc_is_foreign() {
        assert_eq!(
            classify_line(r#"{"level":"info","msg":"ready"}"#),
            LineDisposition::Foreign(ForeignReason::NotJsonRpc)
        );
        assert_eq!(
            classify_line(r#"{"jsonrpc":"1.0","id":1,"result":{}}"#),
            LineDisposition::Foreign(ForeignReason::NotJsonRpc)
        );
    }

    #[test]
    fn test_truncated_object_is_malformed() {
        let d = classify_line(r#"{"jsonrpc":"2.0","id":1,"res"#);
        assert!(matches!(
            d,
            LineDisposition::Foreign(ForeignReason::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_garbage_is_malformed() {
        let d = classify_line(r#"{"jsonrpc":"2.0","id":1,"result":{}} trailing"#);
        assert!(matches!(
            d,
            LineDisposition::Foreign(ForeignReason::Malformed(_))
        ));
    }

    #[test]
    fn test_batch_array_is_not_json_object() {
        assert_eq!(
            classify_line(r#"[{"jsonrpc":"2.0","id":1,"result":{}}]"#),
            LineDisposition::Foreign(ForeignReason::NotJson)
        );
    }

    #[test]
    fn test_unclassifiable_frame_still_protocol() {
        let f = frame(r#"{"jsonrpc":"2.0"}"#);
        assert!(f.kind.is_none());
        assert!(!f.is_request());
    }

    #[test]
    fn test_is_request() {
        assert!(frame(r#"{"jsonrpc":"2.0","id":9,"method":"roots/list"}"#).is_request());
        assert!(!frame(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).is_request());
        assert!(!frame(r#"{"jsonrpc":"2.0","id":9,"result":{}}"#).is_request());
        // A "request" that also carries a result is treated as a response-ish
        // frame and never shimmed.
        assert!(
            !frame(r#"{"jsonrpc":"2.0","id":9,"method":"roots/list","result":{}}"#).is_request()
        );
    }

    #[test]
    fn test_has_error() {
        assert!(
            frame(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"nope"}}"#)
                .has_error()
        );
        assert!(!frame(r#"{"jsonrpc":"2.0","id":2,"result":null}"#).has_error());
    }

    #[test]
    fn test_parse_line_variants() {
        assert!(matches!(parse_line("{}"), ParsedLine::Object(_)));
        assert_eq!(parse_line("hello"), ParsedLine::NotJson);
        assert!(matches!(parse_line("{nope"), ParsedLine::Malformed { .. }));
    }
}
