// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy Administration
//!
//! Creates and updates a tenant's artifacts. Every operation runs under the
//! tenant's exclusive lock and invalidates the tenant cache before the lock
//! is released, so the next request reads the committed state.
//!
//! Updating the natural-language rules is a composite operation: the rules
//! are synthesized into a compiled policy, the compiled policy is committed,
//! then the rules. If the rules cannot be written the compiled policy is
//! restored, so readers never see new rules paired with an old policy or the
//! reverse.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::application::cache::TenantCache;
use crate::application::synthesis::PolicySynthesizer;
use crate::application::write_coordinator::{TenantWriteGuard, WriteCoordinator};
use crate::domain::store::StoreError;
use crate::domain::synthesis::SynthesisOutcome;
use crate::domain::tenant::{ArtifactKind, TenantId, TenantIdError, UnknownArtifactKind};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    InvalidTenant(#[from] TenantIdError),

    #[error(transparent)]
    UnknownKind(#[from] UnknownArtifactKind),

    #[error("at least one table definition is required")]
    EmptySchema,

    #[error("file '{file_name}' is not valid UTF-8: {source}")]
    InvalidEncoding {
        file_name: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("failed to write {kind}: {source}")]
    Write {
        kind: ArtifactKind,
        #[source]
        source: StoreError,
    },
}

/// Result of a successful administrative call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyUpdateReport {
    pub status: String,
    pub policy_id: String,
    pub files_updated: Vec<String>,
    pub message: String,

    /// Present when the call re-synthesized the compiled policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisOutcome>,
}

impl PolicyUpdateReport {
    fn success(tenant: &TenantId, files_updated: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            policy_id: tenant.to_string(),
            files_updated,
            message: message.into(),
            synthesis: None,
        }
    }
}

pub struct PolicyAdminService {
    coordinator: Arc<WriteCoordinator>,
    cache: Arc<TenantCache>,
    synthesizer: Arc<PolicySynthesizer>,
}

impl PolicyAdminService {
    pub fn new(
        coordinator: Arc<WriteCoordinator>,
        cache: Arc<TenantCache>,
        synthesizer: Arc<PolicySynthesizer>,
    ) -> Self {
        Self {
            coordinator,
            cache,
            synthesizer,
        }
    }

    /// Provision a tenant: user table, schema, rules and the compiled policy
    pub async fn create_policy(
        &self,
        tenant: &str,
        user_table: &str,
        db_schema: &[String],
        nl_policy: &str,
    ) -> Result<PolicyUpdateReport, AdminError> {
        let tenant = TenantId::parse(tenant)?;
        let schema = join_table_definitions(db_schema)?;

        let guard = self.coordinator.begin(&tenant).await;
        let result = async {
            let mut files_updated = vec![
                write(&guard, ArtifactKind::UserTable, user_table).await?,
                write(&guard, ArtifactKind::Schema, &schema).await?,
            ];
            let (locations, outcome) = self.commit_rules(&guard, nl_policy).await?;
            files_updated.extend(locations);
            Ok::<_, AdminError>((files_updated, outcome))
        }
        .await;
        self.cache.invalidate(&tenant).await;
        drop(guard);

        let (files_updated, outcome) = result?;
        info!(tenant = %tenant, validated = outcome.is_validated(), "Policy created");

        let mut report =
            PolicyUpdateReport::success(&tenant, files_updated, "Policy created, files saved, and Rego generated.");
        report.synthesis = Some(outcome);
        Ok(report)
    }

    /// Replace one artifact; new rules are re-synthesized and committed
    /// together with their compiled policy.
    pub async fn update_policy(
        &self,
        tenant: &str,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<PolicyUpdateReport, AdminError> {
        let tenant = TenantId::parse(tenant)?;

        let guard = self.coordinator.begin(&tenant).await;
        let result = match kind {
            ArtifactKind::NaturalLanguagePolicy => self
                .commit_rules(&guard, content)
                .await
                .map(|(locations, outcome)| (locations, Some(outcome))),
            _ => write(&guard, kind, content).await.map(|location| (vec![location], None)),
        };
        self.cache.invalidate(&tenant).await;
        drop(guard);

        let (files_updated, synthesis) = result?;
        info!(tenant = %tenant, artifact = %kind, "Policy artifact updated");

        let mut report = PolicyUpdateReport::success(
            &tenant,
            files_updated,
            format!("File '{}' updated successfully.", kind.as_str()),
        );
        report.synthesis = synthesis;
        Ok(report)
    }

    /// As [`update_policy`](Self::update_policy), with the kind given by name
    /// (`sql`, `user_table`, `policy`, `rego`). Unknown names are rejected
    /// before anything is touched.
    pub async fn update_policy_named(
        &self,
        tenant: &str,
        kind: &str,
        content: &str,
    ) -> Result<PolicyUpdateReport, AdminError> {
        let kind: ArtifactKind = kind.parse()?;
        self.update_policy(tenant, kind, content).await
    }

    /// Update an artifact from an uploaded file
    pub async fn upload_file(
        &self,
        tenant: &str,
        kind: ArtifactKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<PolicyUpdateReport, AdminError> {
        let content = String::from_utf8(bytes).map_err(|source| AdminError::InvalidEncoding {
            file_name: file_name.to_string(),
            source,
        })?;
        self.update_policy(tenant, kind, &content).await
    }

    /// Synthesize `rules`, then commit the compiled policy and the rules.
    /// Restores the previous compiled policy if the rules cannot be written.
    async fn commit_rules(
        &self,
        guard: &TenantWriteGuard,
        rules: &str,
    ) -> Result<(Vec<String>, SynthesisOutcome), AdminError> {
        let tenant = guard.tenant();
        let previous = guard
            .read_existing(ArtifactKind::CompiledPolicy)
            .await
            .map_err(|source| AdminError::Write {
                kind: ArtifactKind::CompiledPolicy,
                source,
            })?;

        let outcome = self.synthesizer.synthesize(tenant, rules).await;
        let policy_location = write(guard, ArtifactKind::CompiledPolicy, &outcome.document).await?;

        match write(guard, ArtifactKind::NaturalLanguagePolicy, rules).await {
            Ok(rules_location) => Ok((vec![rules_location, policy_location], outcome)),
            Err(e) => {
                let restored = guard
                    .write(ArtifactKind::CompiledPolicy, previous.as_deref().unwrap_or_default())
                    .await;
                if let Err(restore_error) = restored {
                    error!(tenant = %tenant, "Failed to restore compiled policy: {}", restore_error);
                }
                Err(e)
            }
        }
    }
}

async fn write(guard: &TenantWriteGuard, kind: ArtifactKind, content: &str) -> Result<String, AdminError> {
    guard
        .write(kind, content)
        .await
        .map_err(|source| AdminError::Write { kind, source })
}

/// Trim each definition, drop blanks and join with a blank line
fn join_table_definitions(definitions: &[String]) -> Result<String, AdminError> {
    let tables: Vec<&str> = definitions
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .collect();
    if tables.is_empty() {
        return Err(AdminError::EmptySchema);
    }
    Ok(tables.join("\n\n"))
}
