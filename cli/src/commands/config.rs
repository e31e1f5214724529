// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use querygate_core::domain::gateway_config::GatewayConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./querygate-config.yaml)
        #[arg(short, long, default_value = "./querygate-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration search order:".bold());
        match &config_override {
            Some(path) => println!("  --config: {}", path.display()),
            None => println!("  --config: {}", "(not set)".dimmed()),
        }
        for (rank, path) in GatewayConfigManifest::candidate_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} ({})", rank + 1, path.display(), marker);
        }
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Gateway:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    println!("{}", "LLM Providers:".bold());
    if config.spec.llm_providers.is_empty() {
        println!("  {}", "(none configured)".dimmed());
    }
    for provider in &config.spec.llm_providers {
        let state = if provider.enabled { "enabled".green() } else { "disabled".dimmed() };
        println!("  {} ({}, {})", provider.name.bold(), provider.provider_type, state);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!();

    let selection = &config.spec.llm_selection;
    println!("{}", "LLM Selection:".bold());
    println!("  Default alias: {}", selection.default_alias);
    if let Some(fallback) = &selection.fallback_provider {
        println!("  Fallback provider: {}", fallback);
    }
    println!(
        "  Retries: {} (base delay {} ms), timeout {} s",
        selection.max_retries, selection.retry_delay_ms, selection.timeout_seconds
    );
    println!();

    println!("{}", "Evaluator:".bold());
    println!("  URL: {}", config.spec.evaluator.url);
    println!("  Timeout: {} s", config.spec.evaluator.timeout_seconds);
    println!();

    println!("{}", "Storage:".bold());
    println!("  Data dir: {}", config.spec.storage.data_dir.display());
    println!();

    println!("{}", "Synthesis:".bold());
    println!("  Max attempts: {}", config.spec.synthesis.max_attempts);
    println!("  Draft temperature: {}", config.spec.synthesis.draft_temperature);
    println!("  Rewrite temperature: {}", config.spec.synthesis.rewrite_temperature);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    if with_examples {
        std::fs::write(&output, include_str!("../../templates/config-with-examples.yaml"))
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    } else {
        GatewayConfigManifest::default()
            .to_yaml_file(&output)
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    }

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
