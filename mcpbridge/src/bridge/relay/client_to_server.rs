//! Inbound relay: client stdin → child stdin.
//!
//! Messages are forwarded byte-for-byte. The relay only looks inside them
//! to keep the in-flight table and the monitoring counters current.

use std::sync::Arc;

use mcpbridge_core::StreamDirection;
use mcpbridge_core::filter::{LineDisposition, classify_line};
use mcpbridge_core::jsonrpc::JsonRpcMessageKind;
use tokio::io::BufReader;
use tokio::sync::watch;

use super::helpers::{RelayContext, ensure_newline};
use crate::bridge::governor::{bounded_read_line, skip_line};
use crate::client_io::BoxedReader;
use crate::error::{BridgeError, FramingError};

/// How the inbound relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum InboundEnd {
    /// Client closed its end; the child's stdin has been closed too.
    ClientEof,
    /// The child's stdin is gone (closed or broken). The session continues
    /// until the server side finishes.
    ServerInputClosed,
    /// Stopped by the shutdown channel.
    Shutdown,
}

/// Copy client messages to the child until client EOF or shutdown.
///
/// On client EOF the child's stdin is closed, which is the first step of
/// a graceful shutdown. Oversized client lines are skipped with a warning.
pub(super) async fn client_to_server(
    ctx: Arc<RelayContext>,
    client_input: BoxedReader,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<InboundEnd, BridgeError> {
    let server = ctx.server.as_str();
    let mut reader = BufReader::new(client_input);
    let mut line = Vec::new();

    loop {
        line.clear();

        let bytes_read = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                tracing::debug!(server, "client→server: shutdown signal received");
                return Ok(InboundEnd::Shutdown);
            }
            result = bounded_read_line(&mut reader, &mut line, ctx.max_line_bytes) => {
                match result {
                    Ok(n) => n,
                    Err(FramingError::MessageTooLarge { max_bytes, observed }) => {
                        tracing::warn!(
                            server,
                            max_bytes,
                            observed,
                            "client→server: message exceeded size limit, skipping"
                        );
                        skip_line(&mut reader).await;
                        continue;
                    }
                    Err(source) => {
                        tracing::error!(server, error = %source, "client→server: read failed");
                        return Err(BridgeError::StreamFailed {
                            server: server.to_string(),
                            direction: StreamDirection::ClientToServer,
                            source,
                        });
                    }
                }
            }
        };

        if bytes_read == 0 {
            tracing::info!(server, "client closed stdin, closing server stdin");
            ctx.child_input.close().await;
            return Ok(InboundEnd::ClientEof);
        }

        // Bookkeeping only; the bytes go out unchanged either way.
        let text = String::from_utf8_lossy(&line);
        match classify_line(&text) {
            LineDisposition::Blank => continue,
            LineDisposition::Protocol(frame) => {
                if let Some(ref m) = ctx.monitor {
                    m.record(StreamDirection::ClientToServer, &frame);
                }
                let mut in_flight = ctx.in_flight.lock().await;
                match frame.kind {
                    Some(JsonRpcMessageKind::Request { ref id, ref method })
                        if frame.is_request() =>
                    {
                        in_flight.track(StreamDirection::ClientToServer, id.clone(), method);
                    }
                    Some(JsonRpcMessageKind::Response { ref id }) => {
                        in_flight.complete(StreamDirection::ServerToClient, id);
                    }
                    _ => {}
                }
            }
            LineDisposition::Foreign(reason) => {
                tracing::debug!(
                    server,
                    reason = reason.label(),
                    "client→server: forwarding non-JSON-RPC line unchanged"
                );
            }
        }

        ensure_newline(&mut line);
        match ctx.child_input.write_message(&line).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(server, "client→server: server stdin already closed");
                return Ok(InboundEnd::ServerInputClosed);
            }
            Err(e) => {
                // The request stays in flight; the outbound relay answers it
                // with a server_exited error once the server's output ends.
                tracing::warn!(server, error = %e, "client→server: write to server stdin failed");
                return Ok(InboundEnd::ServerInputClosed);
            }
        }
    }
}
