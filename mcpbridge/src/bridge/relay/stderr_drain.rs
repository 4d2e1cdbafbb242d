//! Child stderr → bridge stderr, tagged with the server name.

use std::sync::Arc;

use tokio::io::BufReader;
use tokio::sync::watch;

use super::helpers::RelayContext;
use crate::bridge::governor::{bounded_read_line, skip_line};
use crate::client_io::BoxedReader;
use crate::error::FramingError;

/// Copy the child's stderr to the diagnostic stream until EOF.
///
/// Stderr is never protocol data, so an oversized line is skipped rather
/// than ending the session, and read errors just stop the drain.
pub(super) async fn drain_stderr(
    ctx: Arc<RelayContext>,
    server_stderr: BoxedReader,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let server = ctx.server.as_str();
    let mut reader = BufReader::new(server_stderr);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return,
            result = bounded_read_line(&mut reader, &mut line, ctx.max_line_bytes) => result,
        };

        match read {
            Ok(0) => return,
            Ok(_) => {
                ctx.diagnostics
                    .tagged(server, &String::from_utf8_lossy(&line))
                    .await;
            }
            Err(FramingError::MessageTooLarge { max_bytes, .. }) => {
                let skipped = skip_line(&mut reader).await;
                ctx.diagnostics
                    .tagged(
                        server,
                        &format!("(stderr line over {max_bytes} bytes skipped, {skipped} more bytes discarded)"),
                    )
                    .await;
            }
            Err(FramingError::Io(e)) => {
                tracing::debug!(server, error = %e, "server stderr read failed");
                return;
            }
        }
    }
}
