// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tenant policy administration
//!
//! Commands: create, update, upload

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use querygate_core::application::PolicyUpdateReport;
use querygate_core::domain::synthesis::SynthesisStatus;
use querygate_core::domain::tenant::ArtifactKind;

use crate::embedded::EmbeddedGateway;

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Provision a tenant from a user table, schema files and rules
    Create {
        #[arg(short, long)]
        tenant: String,

        /// Newline-delimited JSON user records
        #[arg(long, value_name = "FILE")]
        user_table: PathBuf,

        /// Table definition file; repeat for several tables
        #[arg(long = "schema", value_name = "FILE", required = true)]
        schemas: Vec<PathBuf>,

        /// Natural-language access rules
        #[arg(long, value_name = "FILE")]
        rules: PathBuf,
    },

    /// Replace one artifact with inline content
    Update {
        #[arg(short, long)]
        tenant: String,

        /// Artifact kind: sql, user_table, policy or rego
        #[arg(short, long)]
        kind: String,

        #[arg(value_name = "CONTENT")]
        content: String,
    },

    /// Replace one artifact with a file's content
    Upload {
        #[arg(short, long)]
        tenant: String,

        /// Artifact kind: sql, user_table, policy or rego
        #[arg(short, long)]
        kind: String,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: PolicyCommand, config_path: Option<PathBuf>) -> Result<()> {
    // Reject bad kinds before any service is built
    let kind = match &command {
        PolicyCommand::Update { kind, .. } | PolicyCommand::Upload { kind, .. } => {
            Some(kind.parse::<ArtifactKind>()?)
        }
        PolicyCommand::Create { .. } => None,
    };

    let gateway = EmbeddedGateway::new(config_path).await?;
    let admin = &gateway.gate.admin;

    let report = match command {
        PolicyCommand::Create {
            tenant,
            user_table,
            schemas,
            rules,
        } => {
            let user_table = read_text(&user_table)?;
            let schemas = schemas
                .iter()
                .map(|path| read_text(path))
                .collect::<Result<Vec<_>>>()?;
            let rules = read_text(&rules)?;
            admin.create_policy(&tenant, &user_table, &schemas, &rules).await?
        }
        PolicyCommand::Update { tenant, content, .. } => {
            let kind = kind.context("artifact kind")?;
            admin.update_policy(&tenant, kind, &content).await?
        }
        PolicyCommand::Upload { tenant, file, .. } => {
            let kind = kind.context("artifact kind")?;
            let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            admin.upload_file(&tenant, kind, &file_name, bytes).await?
        }
    };

    print_report(&report);
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn print_report(report: &PolicyUpdateReport) {
    println!("{}", format!("✓ {}", report.message).green());
    println!("  Tenant: {}", report.policy_id);
    for file in &report.files_updated {
        println!("  Wrote {}", file);
    }

    let Some(outcome) = &report.synthesis else {
        return;
    };
    match &outcome.status {
        SynthesisStatus::Validated => println!(
            "  Policy validated against {} test case(s) after {} attempt(s)",
            outcome.test_cases, outcome.attempts
        ),
        SynthesisStatus::BestEffort { remaining_failures } => {
            println!(
                "{}",
                format!(
                    "  ⚠ Policy not validated after {} attempt(s); {} failing case(s):",
                    outcome.attempts,
                    remaining_failures.len()
                )
                .yellow()
            );
            for failure in remaining_failures {
                println!("    - {}", failure);
            }
        }
    }
}
