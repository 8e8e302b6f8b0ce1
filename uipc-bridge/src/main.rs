//! UIPC bridge entry point.
//!
//! ```text
//! uipc-bridge                       Run with uipc_bridge.toml
//! uipc-bridge --config <path>       Use a custom config TOML
//! uipc-bridge --host h --port p     Override the remote peer
//! uipc-bridge --gen-config          Dump default config and exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use uipc_bridge::config::{BridgeConfig, ConfigSource, DEFAULT_CONFIG_FILE, Overrides};
use uipc_bridge::logging;
use uipc_bridge::window::HostWindow;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "uipc-bridge", about = "Forward local UIPC requests to a remote TCP peer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Remote peer host (overrides config and XPC_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Remote peer port (overrides config and XPC_PORT).
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(ExitCode::SUCCESS);
    }

    let source = ConfigSource::new(
        cli.config,
        Overrides {
            host: cli.host,
            port: cli.port,
            verbose: cli.verbose,
        },
    );
    let config = source.resolve_from_env()?;

    let target = logging::init(&config);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.endpoint(),
        log = ?target,
        "uipc-bridge starting"
    );

    let window = match HostWindow::create(&config, source) {
        Ok(window) => window,
        Err(e) => {
            error!("cannot create host window: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let code = window.run();
    drop(window);

    info!(code, "uipc-bridge stopped");
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
