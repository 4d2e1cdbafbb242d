//! Transport selector: resolve the requested server and run the matching
//! transport.

use mcpbridge_core::config::{
    BridgeSettings, EnvSource, ProcessEnv, ServerProfile, ServerRegistry, TransportKind,
};

use crate::bridge::run_stdio_bridge;
use crate::cli::BridgeArgs;
use crate::client_io::ClientIo;
use crate::error::BridgeError;
use crate::gateway::run_gateway;

/// Resolve configuration and run one session on the process's own stdio.
///
/// Returns the process exit code. Startup failures are reported on stderr
/// and yield 1 without any JSON-RPC being written.
pub async fn run(args: BridgeArgs) -> i32 {
    match start(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mcpbridge: {e}");
            1
        }
    }
}

async fn start(args: &BridgeArgs) -> Result<i32, BridgeError> {
    let (profile, settings) = resolve(args, &ProcessEnv)?;
    run_profile(profile, &settings, ClientIo::stdio()).await
}

/// Load the servers file and environment, and resolve `args.server`.
pub fn resolve<E: EnvSource + ?Sized>(
    args: &BridgeArgs,
    env: &E,
) -> Result<(ServerProfile, BridgeSettings), BridgeError> {
    let registry = ServerRegistry::load(args.config.as_deref(), env)?;
    let settings = BridgeSettings::from_env(env, registry.gateway_url());
    let profile = registry.resolve(&args.server, settings.gateway_url.as_deref(), env)?;
    tracing::debug!(
        server = %profile.name,
        transport = %profile.transport,
        "server profile resolved"
    );
    Ok((profile, settings))
}

/// Dispatch a resolved profile to its transport.
pub async fn run_profile(
    profile: ServerProfile,
    settings: &BridgeSettings,
    io: ClientIo,
) -> Result<i32, BridgeError> {
    match profile.transport {
        TransportKind::Stdio => run_stdio_bridge(profile, settings, io).await,
        TransportKind::GatewayHttp => run_gateway(&profile, settings, io).await,
    }
}
