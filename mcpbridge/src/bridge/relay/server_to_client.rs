//! Outbound relay: child stdout → client stdout.
//!
//! Every line passes through the protocol filter. Admitted frames are
//! forwarded verbatim, everything else is diverted to the diagnostic
//! stream. Server-initiated requests the profile shims never reach the
//! client: their replies are queued for [`write_shim_replies`], which owns
//! the writes to the child's stdin so this relay never waits on it.
//!
//! Whenever this relay gives up on the server's output, every open client
//! request is answered with a synthetic JSON-RPC error so no client waits
//! on a timeout.

use std::sync::Arc;

use mcpbridge_core::StreamDirection;
use mcpbridge_core::error::{BridgeErrorKind, error_response_line};
use mcpbridge_core::filter::{LineDisposition, ProtocolFrame, classify_line};
use mcpbridge_core::jsonrpc::{JsonRpcId, JsonRpcMessageKind};
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};

use super::helpers::{RelayContext, ShimReply, write_client};
use crate::bridge::governor::bounded_read_line;
use crate::client_io::{BoxedReader, BoxedWriter};
use crate::error::{BridgeError, FramingError};

/// Relay server output to the client until EOF, failure or shutdown.
///
/// # Errors
///
/// `BridgeError::StreamFailed` when a message outgrows the stream limit,
/// reading the server fails, or the client's stdout can no longer be
/// written. Open client requests have already been answered by then.
pub(super) async fn server_to_client(
    ctx: Arc<RelayContext>,
    server_output: BoxedReader,
    mut client_output: BoxedWriter,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    let server = ctx.server.as_str();
    let mut reader = BufReader::new(server_output);
    let mut line = Vec::new();

    loop {
        line.clear();

        let read = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                tracing::debug!(server, "server→client: shutdown signal received");
                break;
            }
            result = bounded_read_line(&mut reader, &mut line, ctx.max_line_bytes) => result,
        };

        match read {
            Ok(0) => {
                tracing::info!(server, "server closed stdout");
                break;
            }
            Ok(_) => {}
            Err(source) => return Err(fail_stream(&ctx, &mut client_output, source).await),
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            tracing::debug!(server, "server→client: non-UTF-8 line diverted");
            ctx.diagnostics
                .tagged(server, &String::from_utf8_lossy(&line))
                .await;
            continue;
        };

        match classify_line(text) {
            LineDisposition::Blank => {}
            LineDisposition::Foreign(reason) => {
                tracing::debug!(
                    server,
                    reason = reason.label(),
                    "server→client: non-protocol line diverted"
                );
                ctx.diagnostics.tagged(server, text).await;
            }
            LineDisposition::Protocol(frame) => {
                relay_frame(&ctx, &mut client_output, frame).await?;
            }
        }
    }

    answer_open_requests(
        &ctx,
        &mut client_output,
        BridgeErrorKind::ServerExited,
        &format!("MCP server '{server}' exited before responding"),
    )
    .await;
    Ok(())
}

/// Forward one admitted frame, or answer it locally when shimmed.
async fn relay_frame(
    ctx: &RelayContext,
    client_output: &mut BoxedWriter,
    frame: ProtocolFrame,
) -> Result<(), BridgeError> {
    if let Some(ref m) = ctx.monitor {
        m.record(StreamDirection::ServerToClient, &frame);
    }

    match frame.kind {
        Some(JsonRpcMessageKind::Request { ref id, ref method }) if frame.is_request() => {
            if ctx.profile.shims(method) {
                answer_locally(ctx, id, method);
                return Ok(());
            }
            ctx.in_flight
                .lock()
                .await
                .track(StreamDirection::ServerToClient, id.clone(), method);
        }
        Some(JsonRpcMessageKind::Response { ref id }) => {
            if ctx
                .in_flight
                .lock()
                .await
                .complete(StreamDirection::ClientToServer, id)
                .is_none()
            {
                tracing::debug!(server = %ctx.server, id = %id, "response for untracked id");
            }
        }
        _ => {}
    }

    if let Err(e) = write_client(client_output, &frame.to_ndjson()).await {
        tracing::warn!(server = %ctx.server, error = %e, "server→client: client stdout write failed");
        return Err(BridgeError::StreamFailed {
            server: ctx.server.clone(),
            direction: StreamDirection::ServerToClient,
            source: FramingError::Io(e),
        });
    }
    Ok(())
}

/// Queue the shim's response for the child's stdin.
fn answer_locally(ctx: &RelayContext, id: &JsonRpcId, method: &str) {
    let reply = ShimReply {
        id: id.clone(),
        method: method.to_string(),
        line: ctx.roots.response_line(id),
    };
    if ctx.shim_replies.send(reply).is_err() {
        tracing::debug!(server = %ctx.server, id = %id, method, "shim writer stopped, reply dropped");
    }
}

/// Write queued shim replies to the child's stdin until shutdown.
///
/// Runs beside the inbound relay and shares its serialized writer, so a
/// child that stops reading stdin only ever blocks this task.
pub(super) async fn write_shim_replies(
    ctx: Arc<RelayContext>,
    mut replies: mpsc::UnboundedReceiver<ShimReply>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let server = ctx.server.as_str();
    loop {
        let reply = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
        };

        let written = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            result = ctx.child_input.write_message(reply.line.as_bytes()) => result,
        };

        let ShimReply { id, method, .. } = reply;
        match written {
            Ok(true) => {
                tracing::debug!(server, id = %id, method = %method, "answered server request locally");
                if let Some(ref m) = ctx.monitor {
                    m.record_kind(
                        StreamDirection::ClientToServer,
                        Some(&JsonRpcMessageKind::Response { id }),
                        false,
                    );
                }
            }
            Ok(false) => {
                tracing::debug!(server, id = %id, method = %method, "server stdin closed, shim reply dropped");
            }
            Err(e) => {
                tracing::warn!(server, id = %id, method = %method, error = %e, "shim reply write failed");
            }
        }
    }
    tracing::debug!(server, "shim reply writer stopped");
}

/// Report a broken outbound stream and answer everything still open.
async fn fail_stream(
    ctx: &RelayContext,
    client_output: &mut BoxedWriter,
    source: FramingError,
) -> BridgeError {
    let server = ctx.server.as_str();
    let (kind, message, diagnostic) = match source {
        FramingError::MessageTooLarge {
            max_bytes,
            observed,
        } => (
            BridgeErrorKind::ResponseTooLarge,
            format!("response from MCP server '{server}' exceeded the {max_bytes}-byte stream limit"),
            format!(
                "server output exceeded the {max_bytes}-byte stream limit \
                 ({observed} bytes without a newline), closing the session"
            ),
        ),
        FramingError::Io(ref e) => (
            BridgeErrorKind::StreamFailed,
            format!("stream from MCP server '{server}' failed"),
            format!("reading server output failed ({e}), closing the session"),
        ),
    };

    tracing::error!(server, error = %source, "server→client: stream failed");
    ctx.diagnostics.tagged(server, &diagnostic).await;
    answer_open_requests(ctx, client_output, kind, &message).await;

    BridgeError::StreamFailed {
        server: server.to_string(),
        direction: StreamDirection::ServerToClient,
        source,
    }
}

/// Answer every open client request with a synthetic error, oldest first.
async fn answer_open_requests(
    ctx: &RelayContext,
    client_output: &mut BoxedWriter,
    kind: BridgeErrorKind,
    message: &str,
) {
    let open = ctx.in_flight.lock().await.drain_client_requests();
    for (id, request) in open {
        tracing::warn!(
            server = %ctx.server,
            id = %id,
            method = %request.method,
            error_type = ?kind,
            "answering in-flight request with a synthetic error"
        );
        let line = error_response_line(&id, &ctx.server, kind, message);
        if let Some(ref m) = ctx.monitor {
            m.record_kind(
                StreamDirection::ServerToClient,
                Some(&JsonRpcMessageKind::Response { id }),
                true,
            );
        }
        if let Err(e) = write_client(client_output, line.as_bytes()).await {
            tracing::debug!(server = %ctx.server, error = %e, "client stdout closed, dropping synthetic errors");
            break;
        }
    }
}
