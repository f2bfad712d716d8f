// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! # toolgate CLI
//!
//! Administrative entry point for the gateway. `toolgate serve` loads a
//! `GatewayConfig`, wires up the configured audit store / backend / citation
//! resolver, and starts the HTTP API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::ServeArgs;

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the gateway configuration file.
    #[arg(short, long, global = true, env = "TOOLGATE_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "TOOLGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway.
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Serve { args }) => {
            if let Err(err) = commands::serve::run(cli.config, args).await {
                tracing::error!(error = %err, "toolgate.serve.fatal");
                eprintln!("{} {err:#}", "error:".red().bold());
                std::process::exit(1);
            }
            Ok(())
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
