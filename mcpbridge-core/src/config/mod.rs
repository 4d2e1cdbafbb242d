//! Bridge configuration: server profiles and process-wide settings.
//!
//! Layering, lowest to highest precedence:
//! 1. Built-in defaults ([`defaults`])
//! 2. The optional YAML servers file ([`loader`])
//! 3. `MCPBRIDGE_*` environment variables
//!
//! Everything here is resolved once at startup and never mutated.

pub mod defaults;
pub mod error;
pub mod loader;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

pub use error::ConfigError;
pub use loader::{ServerEntry, ServerRegistry, ServersFile};

use defaults::{
    DEFAULT_GATEWAY_TIMEOUT, DEFAULT_MONITOR_QUEUE, DEFAULT_SIGTERM_GRACE,
    DEFAULT_STDIN_CLOSE_GRACE, DEFAULT_STREAM_LIMIT, MAX_STREAM_LIMIT, MIN_STREAM_LIMIT,
    parse_env_bool, parse_env_warn,
};

// ─────────────────────────────────────────────────────────────────────────────
// Environment Access
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of environment variables.
///
/// Resolution code takes an `EnvSource` instead of calling `std::env`
/// directly so tests can supply a plain map.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Profile
// ─────────────────────────────────────────────────────────────────────────────

/// How the bridge reaches a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Spawn a child process and relay over its stdin/stdout.
    Stdio,
    /// POST each message to a remote JSON-RPC gateway.
    GatewayHttp,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "gateway-http" | "gateway_http" | "gateway" => Ok(TransportKind::GatewayHttp),
            other => Err(ConfigError::InvalidTransport {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => f.write_str("stdio"),
            TransportKind::GatewayHttp => f.write_str("gateway-http"),
        }
    }
}

/// Command line and environment overrides for a stdio child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra variables set on the child, on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

/// Immutable description of one MCP server, resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProfile {
    pub name: String,
    pub transport: TransportKind,
    /// Always `Some` for [`TransportKind::Stdio`] profiles.
    pub command: Option<ChildCommand>,
    /// Root advertised by the roots shim. Falls back to the working directory.
    pub workspace_root: Option<PathBuf>,
    /// Suffix after `/api/mcp-gateway/{name}`, always starting with `/`.
    pub gateway_path: String,
    /// Server-initiated request methods answered locally.
    pub shim_methods: Vec<String>,
}

impl ServerProfile {
    /// Whether a server-initiated request with this method is answered locally.
    pub fn shims(&self, method: &str) -> bool {
        self.shim_methods.iter().any(|m| m == method)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Byte ceiling for one logical message, clamped to
/// [`MIN_STREAM_LIMIT`]..=[`MAX_STREAM_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimit(usize);

impl StreamLimit {
    /// Clamp `bytes` into the accepted range, warning when it had to move.
    pub fn new(bytes: usize) -> Self {
        let clamped = bytes.clamp(MIN_STREAM_LIMIT, MAX_STREAM_LIMIT);
        if clamped != bytes {
            tracing::warn!(
                requested = bytes,
                clamped,
                "stream limit outside accepted range, clamping"
            );
        }
        Self(clamped)
    }

    pub fn bytes(&self) -> usize {
        self.0
    }
}

impl Default for StreamLimit {
    fn default() -> Self {
        Self(DEFAULT_STREAM_LIMIT)
    }
}

/// Opt-in monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub enabled: bool,
    /// Append-only JSONL event log.
    pub log_path: Option<PathBuf>,
    /// Bounded queue between the relays and the log writer.
    pub queue_capacity: usize,
    /// Print a one-line aggregate to stderr on shutdown.
    pub summary_on_exit: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: None,
            queue_capacity: DEFAULT_MONITOR_QUEUE,
            summary_on_exit: false,
        }
    }
}

/// Child process spawning and termination policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// `PATH` for the child; inherited when `None`.
    pub child_path: Option<String>,
    pub stdin_close_grace: Duration,
    pub sigterm_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            child_path: None,
            stdin_close_grace: DEFAULT_STDIN_CLOSE_GRACE,
            sigterm_grace: DEFAULT_SIGTERM_GRACE,
        }
    }
}

/// Process-wide settings that apply to whichever server is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Base URL of the JSON-RPC gateway, without a trailing slash.
    pub gateway_url: Option<String>,
    pub gateway_timeout: Duration,
    pub stream_limit: StreamLimit,
    pub supervisor: SupervisorSettings,
    pub monitor: MonitorSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            gateway_url: None,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            stream_limit: StreamLimit::default(),
            supervisor: SupervisorSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl BridgeSettings {
    /// Build settings from `MCPBRIDGE_*` variables.
    ///
    /// `file_gateway_url` is the servers file's `gateway_url`, used when
    /// `MCPBRIDGE_GATEWAY_URL` is unset. Invalid numeric values fall back
    /// to their defaults with a warning.
    pub fn from_env<E: EnvSource + ?Sized>(env: &E, file_gateway_url: Option<&str>) -> Self {
        let default = Self::default();

        let gateway_url = env
            .var("MCPBRIDGE_GATEWAY_URL")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| file_gateway_url.map(str::to_string))
            .map(|url| url.trim().trim_end_matches('/').to_string());

        let stream_limit = StreamLimit::new(parse_env_warn(
            env,
            "MCPBRIDGE_MAX_LINE_BYTES",
            DEFAULT_STREAM_LIMIT,
        ));

        let supervisor = SupervisorSettings {
            child_path: env
                .var("MCPBRIDGE_CHILD_PATH")
                .filter(|v| !v.is_empty()),
            stdin_close_grace: Duration::from_millis(parse_env_warn(
                env,
                "MCPBRIDGE_SHUTDOWN_GRACE_MS",
                default.supervisor.stdin_close_grace.as_millis() as u64,
            )),
            sigterm_grace: Duration::from_millis(parse_env_warn(
                env,
                "MCPBRIDGE_KILL_GRACE_MS",
                default.supervisor.sigterm_grace.as_millis() as u64,
            )),
        };

        let monitor = MonitorSettings {
            enabled: parse_env_bool(env, "MCPBRIDGE_MONITOR", false),
            log_path: env
                .var("MCPBRIDGE_MONITOR_LOG")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            queue_capacity: parse_env_warn(env, "MCPBRIDGE_MONITOR_QUEUE", DEFAULT_MONITOR_QUEUE)
                .max(1),
            summary_on_exit: parse_env_bool(env, "MCPBRIDGE_MONITOR_SUMMARY", false),
        };

        Self {
            gateway_url,
            gateway_timeout: Duration::from_secs(parse_env_warn(
                env,
                "MCPBRIDGE_GATEWAY_TIMEOUT_SECS",
                default.gateway_timeout.as_secs(),
            )),
            stream_limit,
            supervisor,
            monitor,
        }
    }
}
