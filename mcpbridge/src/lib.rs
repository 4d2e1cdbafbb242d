//! mcpbridge: presents any MCP server as a plain stdio JSON-RPC server.
//!
//! - [`select`]: picks the transport for the requested server
//! - [`bridge`]: stdio transport (child process supervision and relays)
//! - [`gateway`]: gateway-http transport
//! - [`monitor`]: opt-in message counters and JSONL event log

pub mod bridge;
pub mod cli;
pub mod client_io;
pub mod error;
pub mod gateway;
pub mod monitor;
pub mod select;
