// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mediate one natural-language request and print the decision

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use querygate_core::domain::verdict::{Decision, DecisionKind};

use crate::embedded::EmbeddedGateway;

#[derive(Args)]
pub struct CheckArgs {
    /// Tenant (policy scope) identifier
    #[arg(short, long)]
    pub tenant: String,

    /// Requesting user's id
    #[arg(short, long)]
    pub user: String,

    /// Natural-language request
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// JSON file holding the conversation history (array of messages)
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Print the decision as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: CheckArgs, config_path: Option<PathBuf>) -> Result<()> {
    let history = match &args.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    let gateway = EmbeddedGateway::new(config_path).await?;
    let decision = gateway
        .gate
        .mediation
        .mediate(&args.tenant, &args.user, &args.query, &history)
        .await;
    tracing::debug!(cached = ?gateway.gate.cache.cached_tenants(), "Tenant cache after mediation");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        print_decision(&decision);
    }
    Ok(())
}

fn load_history(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("History file {:?} is not a JSON array", path))
}

fn print_decision(decision: &Decision) {
    let label = match decision.kind {
        DecisionKind::Allow => decision.kind.as_str().green().bold(),
        DecisionKind::Rewrite => decision.kind.as_str().yellow().bold(),
        DecisionKind::Deny => decision.kind.as_str().red().bold(),
    };
    println!("Decision: {}", label);

    if let Some(query) = &decision.rewritten_query {
        println!("Query:    {}", query);
    }
    if let Some(reason) = &decision.reason {
        println!("Reason:   {}", reason);
    }
    if let Some(verdict) = &decision.opa_result {
        println!("{}", "Evaluator result:".dimmed());
        println!("{}", serde_json::to_string_pretty(verdict).unwrap_or_default().dimmed());
    }
}
