//! Error types for the bridge binary.
//!
//! `FramingError` covers bounded line reads: a message that outgrew the
//! stream limit, or an I/O failure on the underlying pipe.
//!
//! `BridgeError` covers startup failures (configuration, spawn) and the
//! session-fatal failures that end a bridge run.

use mcpbridge_core::StreamDirection;
use mcpbridge_core::config::ConfigError;

/// Errors produced while reading one newline-delimited message.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// No newline was found within the configured limit.
    ///
    /// `observed` is how many bytes of the message had been buffered when
    /// the read gave up; the real message is at least that long.
    #[error("message exceeds maximum size of {max_bytes} bytes (observed {observed} bytes)")]
    MessageTooLarge {
        max_bytes: usize,
        observed: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a bridge run.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Server profile or settings could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Server process failed to start.
    #[error("server '{server}' failed to start: {reason}")]
    ServerSpawn { server: String, reason: String },

    /// A relay stream broke in a way that cannot be repaired mid-session.
    #[error("{direction} stream for server '{server}' failed: {source}")]
    StreamFailed {
        server: String,
        direction: StreamDirection,
        source: FramingError,
    },

    /// The HTTP client for gateway mode could not be built.
    #[error("gateway client for server '{server}' could not be created: {reason}")]
    Gateway { server: String, reason: String },

    #[error("IO error: {0}")]
    Io(std::io::Error),
}
