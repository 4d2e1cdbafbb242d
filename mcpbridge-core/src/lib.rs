//! mcpbridge core: transport-agnostic pieces shared by the stdio relay and
//! the HTTP gateway adapter.
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 id and message-kind classification
//! - [`filter`]: best-effort line parsing and the stdout admission decision
//! - [`error`]: synthetic JSON-RPC error responses
//! - [`config`]: server profiles, bridge settings, YAML + environment loading

pub mod config;
pub mod error;
pub mod filter;
pub mod jsonrpc;

/// Direction of a message relative to the bridge.
///
/// `ClientToServer` is client stdin → child stdin (or gateway);
/// `ServerToClient` is child stdout (or gateway response) → client stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDirection {
    ClientToServer,
    ServerToClient,
}

impl StreamDirection {
    /// Stable label used in logs, counters and the monitoring log.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamDirection::ClientToServer => "client_to_server",
            StreamDirection::ServerToClient => "server_to_client",
        }
    }
}

impl std::fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
