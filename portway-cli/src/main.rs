//! Portway unified CLI
//!
//! One binary for both ends of the tunnel: `portway server` on the public
//! machine, `portway client` next to the backend service.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod logging;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "portway",
    author,
    version,
    disable_version_flag = true,
    about = "Minimal TCP reverse tunnel",
    long_about = "Portway exposes a service inside a private network through a single\n\
                  trusted tunnel client. Run `portway server` on the public machine and\n\
                  `portway client` next to the backend service."
)]
struct Cli {
    /// Print version information and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Log every relayed payload
    #[arg(short = 'p', long = "print-message", global = true)]
    print_message: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tunnel server
    Server(commands::server::ServerArgs),

    /// Run the tunnel client
    Client(commands::client::ClientArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => commands::server::run(args, cli.print_message).await,
        Commands::Client(args) => commands::client::run(args, cli.print_message).await,
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
