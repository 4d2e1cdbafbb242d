//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading and server-profile resolution errors.
///
/// All of these are fatal startup errors: they surface before any JSON-RPC
/// session exists, so they are reported on stderr only.
#[derive(Debug, Error)]
pub enum ConfigError {
    // ─────────────────────────────────────────────────────────────────────────
    // Profile resolution
    // ─────────────────────────────────────────────────────────────────────────
    /// No servers file entry and no environment override names this server.
    #[error("unknown MCP server '{name}'")]
    UnknownServer { name: String },

    /// Server names are used in environment keys and URL paths.
    #[error("invalid server name '{name}': must be non-empty and contain no '/' or whitespace")]
    InvalidServerName { name: String },

    /// A stdio profile without a command to spawn.
    #[error("server '{server}' uses the stdio transport but has no command")]
    MissingCommand { server: String },

    /// A gateway-http profile without a gateway base URL.
    #[error(
        "server '{server}' uses the gateway-http transport but no gateway URL is configured \
         (set MCPBRIDGE_GATEWAY_URL or gateway_url)"
    )]
    MissingGatewayUrl { server: String },

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("unknown transport '{value}': expected \"stdio\" or \"gateway-http\"")]
    InvalidTransport { value: String },

    #[error("invalid value for environment variable '{var}': {message}")]
    InvalidEnvValue { var: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // I/O and parsing
    // ─────────────────────────────────────────────────────────────────────────
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_saphyr::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// An explicitly requested servers file does not exist.
    #[error("configuration file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("configuration file is empty: {}", path.display())]
    EmptyConfigFile { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownServer {
            name: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "unknown MCP server 'nope'");

        let err = ConfigError::MissingCommand {
            server: "fs".to_string(),
        };
        assert!(err.to_string().contains("has no command"));
    }
}
