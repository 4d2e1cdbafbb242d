//! Shared state and I/O utilities for the stdio relays.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use mcpbridge_core::StreamDirection;
use mcpbridge_core::config::ServerProfile;
use mcpbridge_core::jsonrpc::JsonRpcId;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};

use super::roots::RootsShim;
use crate::client_io::{BoxedWriter, Diagnostics};
use crate::monitor::Monitor;

// ─────────────────────────────────────────────────────────────────────────────
// Relay Context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the relay tasks share for one session.
pub(super) struct RelayContext {
    pub server: String,
    pub profile: ServerProfile,
    pub in_flight: Mutex<InFlightRequests>,
    pub child_input: ChildInput,
    pub monitor: Option<Arc<Monitor>>,
    pub diagnostics: Diagnostics,
    pub roots: RootsShim,
    /// Queue of shim replies for the child's stdin, drained by its own task.
    pub shim_replies: mpsc::UnboundedSender<ShimReply>,
    /// Byte ceiling for one message, from the stream limit.
    pub max_line_bytes: usize,
}

/// A locally produced answer to a server request, waiting for the child's stdin.
#[derive(Debug)]
pub(super) struct ShimReply {
    pub id: JsonRpcId,
    pub method: String,
    pub line: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// In-flight Requests
// ─────────────────────────────────────────────────────────────────────────────

/// A request that has been forwarded and not yet answered.
#[derive(Debug, Clone)]
pub(super) struct InFlightRequest {
    pub method: String,
    pub sent_at: Instant,
}

/// Open requests in both directions, keyed by JSON-RPC id.
///
/// `client` holds client→server requests, answered by the server's stdout.
/// `server` holds server→client requests, answered by the client's stdin.
/// The two id spaces are independent.
#[derive(Debug, Default)]
pub(super) struct InFlightRequests {
    client: HashMap<JsonRpcId, InFlightRequest>,
    server: HashMap<JsonRpcId, InFlightRequest>,
}

impl InFlightRequests {
    fn table(&mut self, origin: StreamDirection) -> &mut HashMap<JsonRpcId, InFlightRequest> {
        match origin {
            StreamDirection::ClientToServer => &mut self.client,
            StreamDirection::ServerToClient => &mut self.server,
        }
    }

    /// Record a request travelling in direction `origin`.
    pub fn track(&mut self, origin: StreamDirection, id: JsonRpcId, method: &str) {
        self.table(origin).insert(
            id,
            InFlightRequest {
                method: method.to_string(),
                sent_at: Instant::now(),
            },
        );
    }

    /// Remove the request answered by a response, if it was tracked.
    pub fn complete(&mut self, origin: StreamDirection, id: &JsonRpcId) -> Option<InFlightRequest> {
        self.table(origin).remove(id)
    }

    /// Take every open client request, oldest first.
    pub fn drain_client_requests(&mut self) -> Vec<(JsonRpcId, InFlightRequest)> {
        let mut open: Vec<_> = self.client.drain().collect();
        open.sort_by_key(|(_, req)| req.sent_at);
        open
    }

    pub fn len(&self, origin: StreamDirection) -> usize {
        match origin {
            StreamDirection::ClientToServer => self.client.len(),
            StreamDirection::ServerToClient => self.server.len(),
        }
    }

    /// Methods still open in each direction, for the shutdown report.
    pub fn open_methods(&self) -> (Vec<&str>, Vec<&str>) {
        fn collect(map: &HashMap<JsonRpcId, InFlightRequest>) -> Vec<&str> {
            let mut methods: Vec<&str> = map.values().map(|r| r.method.as_str()).collect();
            methods.sort_unstable();
            methods
        }
        (collect(&self.client), collect(&self.server))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Child Input
// ─────────────────────────────────────────────────────────────────────────────

/// Serialized writer for the child's stdin.
///
/// The inbound relay and the shim reply writer both write here; every
/// message is written whole under the lock so the two never interleave.
/// Once closed, writes are refused.
pub(super) struct ChildInput {
    writer: Mutex<Option<BoxedWriter>>,
}

impl ChildInput {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Write one complete message (newline included) and flush.
    ///
    /// Returns `Ok(false)` if the input has already been closed.
    pub async fn write_message(&self, message: &[u8]) -> std::io::Result<bool> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Ok(false);
        };
        writer.write_all(message).await?;
        writer.flush().await?;
        Ok(true)
    }

    /// Close the child's stdin so it sees EOF. Idempotent.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "closing child stdin failed");
            }
        }
    }
}

/// Write one message to the client and flush it.
pub(super) async fn write_client(out: &mut BoxedWriter, message: &[u8]) -> std::io::Result<()> {
    out.write_all(message).await?;
    out.flush().await
}

/// Append the NDJSON terminator when the final line at EOF lacked one.
pub(super) fn ensure_newline(line: &mut Vec<u8>) {
    if line.last() != Some(&b'\n') {
        line.push(b'\n');
    }
}
