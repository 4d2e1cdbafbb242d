//! Synthetic JSON-RPC 2.0 error responses.
//!
//! The bridge fabricates error responses in two places: when the outbound
//! stdio channel breaks with requests still in flight, and when a gateway
//! call fails. Both go through [`error_response_line`] so the wire shape is
//! identical.

use serde::{Deserialize, Serialize};

use crate::jsonrpc::JsonRpcId;

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;

/// Internal JSON-RPC error. Used for every bridge-fabricated failure.
pub const INTERNAL_ERROR: i32 = -32603;

/// Machine-readable reason attached to fabricated errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeErrorKind {
    /// The child's output stream failed (I/O error).
    StreamFailed,
    /// A single message exceeded the configured stream limit.
    ResponseTooLarge,
    /// The child closed stdout before answering.
    ServerExited,
    GatewayTimeout,
    GatewayUnreachable,
    /// The gateway answered with a non-2xx status.
    GatewayStatus,
    /// The gateway answered 2xx with a body that is not JSON-RPC.
    GatewayInvalidResponse,
    /// The client sent a line that is not JSON.
    InvalidRequest,
}

impl BridgeErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            BridgeErrorKind::InvalidRequest => PARSE_ERROR,
            _ => INTERNAL_ERROR,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

/// Context carried in `error.data`. Never contains upstream payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Name of the server profile the bridge was serving.
    pub server: String,
    pub error_type: BridgeErrorKind,
}

/// Complete JSON-RPC 2.0 error response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse<'a> {
    pub jsonrpc: &'static str,
    pub id: &'a JsonRpcId,
    pub error: JsonRpcError,
}

/// Build one NDJSON line (with trailing newline) carrying an error response.
pub fn error_response_line(
    id: &JsonRpcId,
    server: &str,
    kind: BridgeErrorKind,
    message: impl Into<String>,
) -> String {
    let response = ErrorResponse {
        jsonrpc: "2.0",
        id,
        error: JsonRpcError {
            code: kind.code(),
            message: message.into(),
            data: Some(ErrorData {
                server: server.to_string(),
                error_type: kind,
            }),
        },
    };

    // Serializing plain strings and integers cannot fail.
    let mut line = serde_json::to_string(&response).unwrap_or_else(|_| {
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{INTERNAL_ERROR},"message":"internal error"}}}}"#
        )
    });
    line.push('\n');
    line
}
