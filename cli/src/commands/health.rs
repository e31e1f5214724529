// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reachability of the artifact store, the evaluator and the LLM providers

use anyhow::Result;
use colored::Colorize;
use std::fmt::Display;
use std::path::PathBuf;

use querygate_core::domain::evaluator::PolicyEvaluator;
use querygate_core::domain::store::ArtifactStore;

use crate::embedded::EmbeddedGateway;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let gateway = EmbeddedGateway::new(config_path).await?;
    let mut healthy = true;

    healthy &= report("Artifact store", gateway.store.health_check().await);
    healthy &= report(
        &format!("Evaluator ({})", gateway.evaluator.base_url()),
        gateway.evaluator.health_check().await,
    );

    let providers = gateway.registry.health_check_all().await;
    if providers.is_empty() {
        println!("  {} LLM providers: {}", "-".dimmed(), "(none configured)".dimmed());
    }
    for (name, result) in providers {
        healthy &= report(&format!("LLM provider {}", name), result);
    }

    let aliases = gateway.registry.available_aliases();
    if !aliases.is_empty() {
        println!("  {} Model aliases: {}", "-".dimmed(), aliases.join(", "));
    }

    if !healthy {
        anyhow::bail!("One or more components are unhealthy");
    }
    Ok(())
}

fn report<E: Display>(component: &str, result: Result<(), E>) -> bool {
    match result {
        Ok(()) => {
            println!("  {} {}", "✓".green(), component);
            true
        }
        Err(e) => {
            println!("  {} {}: {}", "✗".red(), component, e);
            false
        }
    }
}
