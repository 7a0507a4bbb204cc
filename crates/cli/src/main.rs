// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use quern::config::Config;
use quern::lifecycle;

#[derive(Parser)]
#[command(name = "quern", version, about = "Local debugging service for iOS simulators and devices.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the server (daemonized unless --foreground).
    Start(Config),
    /// Stop a running server.
    Stop(Config),
    /// Stop then start.
    Restart(Config),
    /// Report whether a server is running (exit 2 when not).
    Status(Config),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Start(config) => {
            if let Err(e) = config.validate() {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
            lifecycle::cmd_start(config).await
        }
        Commands::Stop(config) => lifecycle::cmd_stop(config).await,
        Commands::Restart(config) => {
            if let Err(e) = config.validate() {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
            lifecycle::cmd_restart(config).await
        }
        Commands::Status(config) => lifecycle::cmd_status(config).await,
    };
    std::process::exit(code);
}
