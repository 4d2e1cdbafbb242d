//! Servers file loading and server-profile resolution.
//!
//! A profile is assembled from the servers file entry (if any) with
//! per-server environment overrides applied on top:
//!
//! | variable                                | field            |
//! |-----------------------------------------|------------------|
//! | `MCPBRIDGE_SERVER_<NAME>_TRANSPORT`     | `transport`      |
//! | `MCPBRIDGE_SERVER_<NAME>_COMMAND`       | `command`        |
//! | `MCPBRIDGE_SERVER_<NAME>_ARGS`          | `args` (shell words) |
//! | `MCPBRIDGE_SERVER_<NAME>_WORKSPACE_ROOT`| `workspace_root` |
//! | `MCPBRIDGE_SERVER_<NAME>_GATEWAY_PATH`  | `gateway_path`   |
//! | `MCPBRIDGE_SERVER_<NAME>_SHIM_METHODS`  | `shim_methods` (comma list) |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::defaults::{DEFAULT_GATEWAY_PATH, DEFAULT_SHIM_METHODS, ENV_PREFIX};
use super::{ChildCommand, ConfigError, EnvSource, ServerProfile, TransportKind};

/// Servers file looked up in the working directory when nothing else is set.
pub const DEFAULT_CONFIG_FILE: &str = "mcpbridge.yaml";

/// Top-level shape of the YAML servers file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServersFile {
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerEntry>,
}

/// One server as written in the servers file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerEntry {
    pub transport: Option<TransportKind>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub workspace_root: Option<PathBuf>,
    pub gateway_path: Option<String>,
    pub shim_methods: Option<Vec<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// File Discovery and Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Locate the servers file.
///
/// Priority: explicit path (CLI flag), `MCPBRIDGE_CONFIG`, then
/// `./mcpbridge.yaml`. An explicit or env-provided path that does not exist
/// is an error; a missing default file just means "no file".
pub fn find_config_file<E: EnvSource + ?Sized>(
    explicit_path: Option<&Path>,
    env: &E,
) -> Result<Option<PathBuf>, ConfigError> {
    let requested = explicit_path
        .map(Path::to_path_buf)
        .or_else(|| env.var("MCPBRIDGE_CONFIG").map(PathBuf::from));

    if let Some(path) = requested {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound { path });
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    Ok(local.exists().then_some(local))
}

/// Read and parse a servers file.
pub fn load_servers_file(path: &Path) -> Result<ServersFile, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile {
            path: path.to_path_buf(),
        });
    }
    parse_servers_file(&contents)
}

/// Parse servers file YAML.
pub fn parse_servers_file(contents: &str) -> Result<ServersFile, ConfigError> {
    Ok(serde_saphyr::from_str(contents)?)
}

/// Environment key for a per-server override.
///
/// The name is uppercased and every non-alphanumeric byte becomes `_`, so
/// `my-server.v2` maps to `MCPBRIDGE_SERVER_MY_SERVER_V2_<FIELD>`.
pub fn server_env_key(name: &str, field: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ENV_PREFIX}SERVER_{normalized}_{field}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Registry
// ─────────────────────────────────────────────────────────────────────────────

/// The set of servers the bridge knows how to reach.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    file: ServersFile,
    source: Option<PathBuf>,
}

impl ServerRegistry {
    /// Locate and load the servers file (if any).
    pub fn load<E: EnvSource + ?Sized>(
        explicit_path: Option<&Path>,
        env: &E,
    ) -> Result<Self, ConfigError> {
        match find_config_file(explicit_path, env)? {
            Some(path) => {
                let file = load_servers_file(&path)?;
                tracing::debug!(path = %path.display(), servers = file.servers.len(), "loaded servers file");
                Ok(Self {
                    file,
                    source: Some(path),
                })
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(file: ServersFile) -> Self {
        Self { file, source: None }
    }

    /// Path the registry was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// `gateway_url` from the servers file.
    pub fn gateway_url(&self) -> Option<&str> {
        self.file.gateway_url.as_deref()
    }

    /// Resolve `name` into a validated [`ServerProfile`].
    ///
    /// `gateway_url` is the effective base URL (env or file); it is only
    /// checked for gateway-http profiles.
    pub fn resolve<E: EnvSource + ?Sized>(
        &self,
        name: &str,
        gateway_url: Option<&str>,
        env: &E,
    ) -> Result<ServerProfile, ConfigError> {
        if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidServerName {
                name: name.to_string(),
            });
        }

        let var = |field: &str| {
            env.var(&server_env_key(name, field))
                .filter(|v| !v.trim().is_empty())
        };

        let env_transport = var("TRANSPORT");
        let env_command = var("COMMAND");
        let env_args = var("ARGS");
        let env_root = var("WORKSPACE_ROOT");
        let env_gateway_path = var("GATEWAY_PATH");
        let env_shims = var("SHIM_METHODS");

        let defined_by_env = env_transport.is_some() || env_command.is_some();
        let mut entry = match (self.file.servers.get(name), defined_by_env) {
            (Some(entry), _) => entry.clone(),
            (None, true) => ServerEntry::default(),
            (None, false) => {
                return Err(ConfigError::UnknownServer {
                    name: name.to_string(),
                });
            }
        };

        if let Some(t) = env_transport {
            entry.transport = Some(t.parse()?);
        }
        if let Some(cmd) = env_command {
            entry.command = Some(cmd);
        }
        if let Some(raw) = env_args {
            entry.args = shell_words::split(&raw).map_err(|e| ConfigError::InvalidEnvValue {
                var: server_env_key(name, "ARGS"),
                message: e.to_string(),
            })?;
        }
        if let Some(root) = env_root {
            entry.workspace_root = Some(PathBuf::from(root));
        }
        if let Some(path) = env_gateway_path {
            entry.gateway_path = Some(path);
        }
        if let Some(raw) = env_shims {
            entry.shim_methods = Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }

        let transport = entry.transport.unwrap_or(TransportKind::Stdio);

        let command = match transport {
            TransportKind::Stdio => {
                let program = entry
                    .command
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingCommand {
                        server: name.to_string(),
                    })?;
                Some(ChildCommand {
                    program,
                    args: entry.args,
                    env: entry.env,
                })
            }
            TransportKind::GatewayHttp => {
                let url = gateway_url.ok_or_else(|| ConfigError::MissingGatewayUrl {
                    server: name.to_string(),
                })?;
                validate_gateway_url(url)?;
                None
            }
        };

        let gateway_path = match entry.gateway_path {
            Some(p) if p.starts_with('/') => p,
            Some(p) => format!("/{p}"),
            None => DEFAULT_GATEWAY_PATH.to_string(),
        };

        Ok(ServerProfile {
            name: name.to_string(),
            transport,
            command,
            workspace_root: entry.workspace_root,
            gateway_path,
            shim_methods: entry.shim_methods.unwrap_or_else(|| {
                DEFAULT_SHIM_METHODS.iter().map(|m| m.to_string()).collect()
            }),
        })
    }
}

fn validate_gateway_url(url: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}
