//! Stdio session orchestration.
//!
//! One session is one child process and four relay tasks:
//!
//! ```text
//!  client stdin  ──► client_to_server ──► child stdin
//!  client stdout ◄── server_to_client ◄── child stdout
//!                          │
//!                          └─► write_shim_replies ─► child stdin
//!  bridge stderr ◄── drain_stderr ◄────── child stderr
//! ```
//!
//! The session ends on client EOF, server exit, a broken outbound stream,
//! or SIGINT/SIGTERM. The client side is always stopped first, then the
//! child, and only then is the outbound relay allowed to finish so output
//! the child wrote before exiting still reaches the client.

mod client_to_server;
mod helpers;
mod roots;
mod server_to_client;
mod stderr_drain;

use std::sync::Arc;
use std::time::Duration;

use mcpbridge_core::StreamDirection;
use mcpbridge_core::config::{BridgeSettings, ConfigError, ServerProfile};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use client_to_server::{InboundEnd, client_to_server};
use helpers::{ChildInput, InFlightRequests, RelayContext};
use roots::RootsShim;
use server_to_client::{server_to_client, write_shim_replies};
use stderr_drain::drain_stderr;

use super::lifecycle::{SessionEnd, termination_signal};
use super::supervisor::{SupervisedChild, spawn_server, terminate_server};
use crate::client_io::{ClientIo, Diagnostics};
use crate::error::BridgeError;
use crate::monitor::Monitor;

/// How long the inbound relay gets to notice the stop signal.
const INBOUND_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// How long output already written by an exited child may take to drain.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run one stdio session for `profile` and return the bridge's exit code.
///
/// # Errors
///
/// Only startup failures are returned as errors (missing command, spawn
/// failure). Everything that happens once the child is running is handled
/// here and reflected in the exit code.
pub async fn run_stdio_bridge(
    profile: ServerProfile,
    settings: &BridgeSettings,
    io: ClientIo,
) -> Result<i32, BridgeError> {
    let server = profile.name.clone();
    let command = profile
        .command
        .clone()
        .ok_or_else(|| ConfigError::MissingCommand {
            server: server.clone(),
        })?;

    let SupervisedChild {
        mut child,
        stdin,
        stdout,
        stderr,
    } = spawn_server(&server, &command, &settings.supervisor)?;

    let ClientIo {
        input,
        output,
        diagnostics,
    } = io;

    let roots = RootsShim::new(profile.workspace_root.as_deref());
    let (shim_tx, shim_rx) = mpsc::unbounded_channel();
    let ctx = Arc::new(RelayContext {
        server: server.clone(),
        profile,
        in_flight: Mutex::new(InFlightRequests::default()),
        child_input: ChildInput::new(Box::new(stdin)),
        monitor: Monitor::start(&server, &settings.monitor),
        diagnostics: Diagnostics::new(diagnostics),
        roots,
        shim_replies: shim_tx,
        max_line_bytes: settings.stream_limit.bytes(),
    });

    // Separate stop channels: the client side is stopped before the child,
    // the server side only after it.
    let (stop_input_tx, stop_input_rx) = watch::channel(false);
    let (stop_output_tx, stop_output_rx) = watch::channel(false);

    let mut shim_writer = tokio::spawn(write_shim_replies(
        ctx.clone(),
        shim_rx,
        stop_input_rx.clone(),
    ));
    let mut c2s = tokio::spawn(client_to_server(ctx.clone(), input, stop_input_rx));
    let mut s2c = tokio::spawn(server_to_client(
        ctx.clone(),
        Box::new(stdout),
        output,
        stop_output_rx.clone(),
    ));
    let mut drain = tokio::spawn(drain_stderr(ctx.clone(), Box::new(stderr), stop_output_rx));

    // ── Wait for the session to end ─────────────────────────────────────
    let signal = termination_signal();
    tokio::pin!(signal);
    let mut inbound_open = true;
    let mut outbound_open = true;

    let mut end = loop {
        tokio::select! {
            result = &mut c2s, if inbound_open => {
                inbound_open = false;
                match result {
                    Ok(Ok(InboundEnd::ClientEof)) => {
                        tracing::info!(server, "client→server stream closed (stdin EOF)");
                        break SessionEnd::ClientClosed;
                    }
                    Ok(Ok(_)) => {
                        tracing::debug!(server, "server stdin closed, waiting for server output to end");
                    }
                    Ok(Err(ref e)) => {
                        tracing::error!(server, error = %e, "client→server task failed");
                        break SessionEnd::ClientFailed;
                    }
                    Err(ref e) => {
                        tracing::error!(server, error = %e, "client→server task panicked");
                        break SessionEnd::ClientFailed;
                    }
                }
            }
            result = &mut s2c, if outbound_open => {
                outbound_open = false;
                match result {
                    Ok(Ok(())) => {
                        tracing::info!(server, "server→client stream closed (server stdout EOF)");
                        break SessionEnd::ServerClosed;
                    }
                    Ok(Err(ref e)) => {
                        tracing::error!(server, error = %e, "server→client task failed");
                        break SessionEnd::ChannelFailed;
                    }
                    Err(ref e) => {
                        tracing::error!(server, error = %e, "server→client task panicked");
                        break SessionEnd::ChannelFailed;
                    }
                }
            }
            status = child.wait() => {
                match status {
                    Ok(ref s) => tracing::info!(server, ?s, "server process exited"),
                    Err(ref e) => tracing::error!(server, error = %e, "failed to wait on server process"),
                }
                break SessionEnd::ServerExited;
            }
            _ = &mut signal => {
                break SessionEnd::Signalled;
            }
        }
    };

    // ── Stop the client side ────────────────────────────────────────────
    let _ = stop_input_tx.send(true);
    if inbound_open && tokio::time::timeout(INBOUND_STOP_TIMEOUT, &mut c2s).await.is_err() {
        tracing::debug!(server, "client→server task did not stop, aborting");
        c2s.abort();
    }
    if tokio::time::timeout(INBOUND_STOP_TIMEOUT, &mut shim_writer)
        .await
        .is_err()
    {
        tracing::debug!(server, "shim reply writer did not stop, aborting");
        shim_writer.abort();
    }
    ctx.child_input.close().await;

    // ── Stop the child ──────────────────────────────────────────────────
    let policy = end.shutdown_policy(&settings.supervisor);
    let exit = terminate_server(&server, &mut child, &policy).await;

    // ── Let the server side drain ───────────────────────────────────────
    if outbound_open {
        match finish_task(&mut s2c, &stop_output_tx).await {
            Some(Ok(Err(e))) => {
                tracing::error!(server, error = %e, "server→client task failed while draining");
                end = SessionEnd::ChannelFailed;
            }
            Some(Err(e)) => {
                tracing::error!(server, error = %e, "server→client task panicked while draining");
            }
            Some(Ok(Ok(()))) | None => {}
        }
    }
    if let Some(Err(e)) = finish_task(&mut drain, &stop_output_tx).await {
        tracing::debug!(server, error = %e, "stderr drain task failed");
    }

    // ── Report ──────────────────────────────────────────────────────────
    if let Some(ref m) = ctx.monitor {
        let snapshot = m.finish().await;
        if m.summary_on_exit() {
            ctx.diagnostics.tagged(&server, &snapshot.summary_line()).await;
        }
    }

    {
        let in_flight = ctx.in_flight.lock().await;
        let (client, server_side) = in_flight.open_methods();
        if !client.is_empty() {
            tracing::warn!(server, ?client, "orphaned client requests at shutdown");
        }
        if !server_side.is_empty() {
            tracing::warn!(
                server,
                count = in_flight.len(StreamDirection::ServerToClient),
                methods = ?server_side,
                "server requests never answered by the client"
            );
        }
    }

    let code = match exit {
        Ok(ref exit) => end.exit_code(exit),
        Err(ref e) => {
            tracing::error!(server, error = %e, "failed to reap server process");
            1
        }
    };
    tracing::info!(server, ?end, code, "session finished");
    Ok(code)
}

/// Wait for a server-side task, stopping it if it will not end by itself.
///
/// Returns `None` when the task had to be aborted.
async fn finish_task<T>(
    handle: &mut JoinHandle<T>,
    stop_output_tx: &watch::Sender<bool>,
) -> Option<Result<T, tokio::task::JoinError>> {
    if let Ok(result) = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut *handle).await {
        return Some(result);
    }
    let _ = stop_output_tx.send(true);
    match tokio::time::timeout(INBOUND_STOP_TIMEOUT, &mut *handle).await {
        Ok(result) => Some(result),
        Err(_) => {
            handle.abort();
            None
        }
    }
}
