//! Stdio transport: supervise a local MCP server and relay its streams.
//!
//! - [`governor`]: bounded line reads (the stream limit)
//! - [`lifecycle`]: session end causes, exit codes, termination signals
//! - [`supervisor`]: spawning and stopping the child process
//! - the relay tasks and the `roots/list` shim live in a private module

pub mod governor;
pub mod lifecycle;
mod relay;
pub mod supervisor;

pub use relay::run_stdio_bridge;
