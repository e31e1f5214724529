// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # QueryGate CLI
//!
//! The `querygate` binary mediates natural-language data requests against
//! per-tenant policies and administers those policies.
//!
//! ## Commands
//!
//! - `querygate check` - Mediate one request and print the decision
//! - `querygate policy create|update|upload` - Tenant policy administration
//! - `querygate config show|validate|generate` - Configuration management
//! - `querygate health` - Check store, evaluator and LLM providers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use querygate::commands::{self, CheckArgs, ConfigCommand, PolicyCommand};
use querygate_core::domain::gateway_config::GatewayConfigManifest;

/// QueryGate - policy-governed natural-language query mediation
#[derive(Parser)]
#[command(name = "querygate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "QUERYGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the
    /// configured level
    #[arg(long, global = true, env = "QUERYGATE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mediate a natural-language request
    #[command(name = "check")]
    Check(CheckArgs),

    /// Tenant policy administration
    #[command(name = "policy")]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Check reachability of the gateway's collaborators
    #[command(name = "health")]
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logging settings come from the configuration unless overridden
    let logging = GatewayConfigManifest::load_or_default(cli.config.clone())
        .map(|config| config.logging())
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level);
    init_logging(&level, &logging.format)?;

    match cli.command {
        Some(Commands::Check(args)) => commands::check::execute(args, cli.config).await,
        Some(Commands::Policy { command }) => commands::policy::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Health) => commands::health::execute(cli.config).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
