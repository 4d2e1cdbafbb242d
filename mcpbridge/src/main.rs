//! mcpbridge CLI entry point.

use clap::Parser;

use mcpbridge::cli::BridgeArgs;

/// Bridge an MCP client's stdio to a local or remote MCP server.
#[derive(Parser)]
#[command(name = "mcpbridge", version)]
struct Cli {
    #[command(flatten)]
    args: BridgeArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.args.verbose);

    let code = mcpbridge::select::run(cli.args).await;
    std::process::exit(code);
}

/// Logs go to stderr; stdout carries only the protocol stream.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
