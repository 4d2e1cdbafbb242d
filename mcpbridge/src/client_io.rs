//! Handles for the bridge's own three standard streams.
//!
//! Production runs use the process's stdin/stdout/stderr; tests substitute
//! in-memory pipes.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The client-facing side of the bridge.
pub struct ClientIo {
    /// Client requests (the bridge's stdin).
    pub input: BoxedReader,
    /// Protocol stream to the client (the bridge's stdout).
    pub output: BoxedWriter,
    /// Human-readable diagnostics (the bridge's stderr).
    pub diagnostics: BoxedWriter,
}

impl ClientIo {
    pub fn stdio() -> Self {
        Self {
            input: Box::new(tokio::io::stdin()),
            output: Box::new(tokio::io::stdout()),
            diagnostics: Box::new(tokio::io::stderr()),
        }
    }
}

/// Shared, line-serialized writer for the diagnostic stream.
///
/// Several tasks (outbound relay, child stderr drain, monitoring summary)
/// write here. Each call writes one complete line under the lock so lines
/// never interleave.
#[derive(Clone)]
pub struct Diagnostics {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl Diagnostics {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write `[server] text` as one line.
    ///
    /// Failures are logged and swallowed: losing a diagnostic line must
    /// never take the relay down.
    pub async fn tagged(&self, server: &str, text: &str) {
        let mut line = Vec::with_capacity(server.len() + text.len() + 4);
        line.push(b'[');
        line.extend_from_slice(server.as_bytes());
        line.extend_from_slice(b"] ");
        line.extend_from_slice(text.trim_end_matches(&['\r', '\n'][..]).as_bytes());
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        let result = async {
            guard.write_all(&line).await?;
            guard.flush().await
        }
        .await;
        if let Err(e) = result {
            tracing::debug!(server, error = %e, "failed to write diagnostic line");
        }
    }
}
