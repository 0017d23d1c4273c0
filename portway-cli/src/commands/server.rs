//! Server subcommand implementation

use anyhow::{Context, Result};
use clap::Args;
use portway_common::constants::DEFAULT_CONFIG_PATH;
use portway_common::{ServerConfig, Settings};
use portway_core::ProxyServer;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Path to the configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "PORTWAY_CONFIG")]
    config: PathBuf,
}

pub async fn run(args: ServerArgs, print_message: bool) -> Result<()> {
    crate::logging::init();
    info!("Starting Portway server v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let config = ServerConfig::from_settings(&settings).with_print_payloads(print_message);

    ProxyServer::new(config).run().await?;
    Ok(())
}
