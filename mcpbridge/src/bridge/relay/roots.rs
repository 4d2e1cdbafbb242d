//! Local answer for server-initiated `roots/list` requests.
//!
//! Some MCP servers ask the client for its workspace roots during
//! initialization and block until answered. Many clients never implement
//! the capability, so the bridge answers on the child's stdin itself and
//! the request never reaches the client.

use std::path::{Path, PathBuf};

use mcpbridge_core::jsonrpc::JsonRpcId;
use serde_json::{Value, json};

/// Precomputed `roots/list` result for one session.
#[derive(Debug, Clone)]
pub struct RootsShim {
    result: Value,
}

impl RootsShim {
    /// Advertise `workspace_root` (made absolute against the working
    /// directory), or the working directory itself.
    pub fn new(workspace_root: Option<&Path>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let root = match workspace_root {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => cwd.join(path),
            None => cwd,
        };
        Self::for_root(&root)
    }

    fn for_root(root: &Path) -> Self {
        let uri = url::Url::from_file_path(root)
            .map(String::from)
            .unwrap_or_else(|()| format!("file://{}", root.display()));
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        Self {
            result: json!({ "roots": [{ "uri": uri, "name": name }] }),
        }
    }

    /// NDJSON response (newline included) answering request `id`.
    pub fn response_line(&self, id: &JsonRpcId) -> String {
        let response = json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": self.result,
        });
        let mut line = response.to_string();
        line.push('\n');
        line
    }
}
