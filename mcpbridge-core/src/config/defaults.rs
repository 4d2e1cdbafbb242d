//! Centralized default values and environment parsing helpers.

use std::time::Duration;

use tracing::warn;

use super::EnvSource;

/// Prefix shared by every environment variable the bridge reads.
pub const ENV_PREFIX: &str = "MCPBRIDGE_";

/// Default ceiling for one logical message on a stream (8 MiB).
pub const DEFAULT_STREAM_LIMIT: usize = 8 * 1024 * 1024;

/// Smallest accepted stream limit (64 KiB).
pub const MIN_STREAM_LIMIT: usize = 64 * 1024;

/// Largest accepted stream limit (64 MiB).
pub const MAX_STREAM_LIMIT: usize = 64 * 1024 * 1024;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Path appended after `/api/mcp-gateway/{server}`.
pub const DEFAULT_GATEWAY_PATH: &str = "/rpc";

/// Server-initiated requests answered locally unless a profile says otherwise.
pub const DEFAULT_SHIM_METHODS: &[&str] = &["roots/list"];

pub const DEFAULT_MONITOR_QUEUE: usize = 1024;

/// Wait after closing the child's stdin before SIGTERM.
pub const DEFAULT_STDIN_CLOSE_GRACE: Duration = Duration::from_millis(2000);

/// Wait after SIGTERM before SIGKILL.
pub const DEFAULT_SIGTERM_GRACE: Duration = Duration::from_millis(2000);

/// Parse an environment variable with a warning on invalid values.
pub fn parse_env_warn<T, E>(env: &E, name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
    E: EnvSource + ?Sized,
{
    match env.var(name) {
        Some(val) => match val.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        None => default,
    }
}

/// Parse a boolean flag. Accepts `1/true/yes/on` and `0/false/no/off`.
pub fn parse_env_bool<E: EnvSource + ?Sized>(env: &E, name: &str, default: bool) -> bool {
    let Some(val) = env.var(name) else {
        return default;
    };
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            warn!(env_var = name, value = %val, default, "Invalid boolean, using default");
            default
        }
    }
}
