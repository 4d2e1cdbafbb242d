//! Command-line arguments.
//!
//! Kept apart from `main.rs` so integration tests can build them directly.

use std::path::PathBuf;

use clap::Args;

/// Arguments for one bridge run.
#[derive(Args, Debug, Clone)]
pub struct BridgeArgs {
    /// Name of the MCP server to bridge to.
    pub server: String,

    /// Servers file (YAML). Defaults to `./mcpbridge.yaml` when present.
    #[arg(long, env = "MCPBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging on stderr (overrides RUST_LOG).
    #[arg(long, short)]
    pub verbose: bool,
}
