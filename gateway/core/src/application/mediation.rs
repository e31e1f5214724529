// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Query Mediation Pipeline
//!
//! Request-time decision engine. For one natural-language request it
//!
//! 1. resolves the caller's user record from the tenant cache,
//! 2. asks the oracle for a structured [`QueryIntent`],
//! 3. resolves the tenant's compiled policy,
//! 4. installs that policy in the evaluator and evaluates
//!    `{user, query_request}` at `<tenant>.access.result`,
//! 5. classifies the verdict and, for a REWRITE, asks the oracle to narrow
//!    the request.
//!
//! Every stage fails closed: [`MediationService::mediate`] never returns an
//! error, only a DENY carrying the reason. Stages 3 and 4 run under the
//! tenant's shared lease from the [`WriteCoordinator`].

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::bounded;
use crate::application::cache::TenantCache;
use crate::application::prompts::{PromptBook, DEFAULT_SCHEMA};
use crate::application::reply_parser::{self, ReplyError};
use crate::application::write_coordinator::WriteCoordinator;
use crate::domain::evaluator::{EvaluatorError, PolicyEvaluator};
use crate::domain::gateway_config::GatewayConfigSpec;
use crate::domain::intent::{IntentError, QueryIntent};
use crate::domain::llm::{LLMError, LLMProvider};
use crate::domain::store::ArtifactStore;
use crate::domain::tenant::{ArtifactKind, TenantId};
use crate::domain::verdict::{Decision, DecisionKind, EvaluationVerdict, VerdictError};

pub const IDENTITY_NOT_FOUND: &str = "User or Policy ID not found.";
pub const POLICY_NOT_FOUND: &str = "Policy file not found.";
pub const DEFAULT_DENY_REASON: &str = "Access denied by policy.";

/// Why an oracle or evaluator stage failed; rendered into the DENY reason
#[derive(Debug, Error)]
enum StageError {
    #[error(transparent)]
    Oracle(#[from] LLMError),

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    #[error(transparent)]
    Verdict(#[from] VerdictError),

    #[error("{0}")]
    Prompt(String),
}

#[derive(Debug, Clone)]
pub struct MediationSettings {
    pub oracle_timeout: Duration,
    pub evaluator_timeout: Duration,
    pub rewrite_temperature: f32,
}

impl Default for MediationSettings {
    fn default() -> Self {
        Self {
            oracle_timeout: Duration::from_secs(60),
            evaluator_timeout: Duration::from_secs(10),
            rewrite_temperature: 0.1,
        }
    }
}

impl MediationSettings {
    pub fn from_config(spec: &GatewayConfigSpec) -> Self {
        Self {
            oracle_timeout: spec.llm_selection.timeout(),
            evaluator_timeout: spec.evaluator.timeout(),
            rewrite_temperature: spec.synthesis.rewrite_temperature,
        }
    }
}

pub struct MediationService {
    cache: Arc<TenantCache>,
    coordinator: Arc<WriteCoordinator>,
    store: Arc<dyn ArtifactStore>,
    oracle: Arc<dyn LLMProvider>,
    evaluator: Arc<dyn PolicyEvaluator>,
    prompts: Arc<PromptBook>,
    settings: MediationSettings,
}

impl MediationService {
    pub fn new(
        cache: Arc<TenantCache>,
        coordinator: Arc<WriteCoordinator>,
        store: Arc<dyn ArtifactStore>,
        oracle: Arc<dyn LLMProvider>,
        evaluator: Arc<dyn PolicyEvaluator>,
        prompts: Arc<PromptBook>,
        settings: MediationSettings,
    ) -> Self {
        Self {
            cache,
            coordinator,
            store,
            oracle,
            evaluator,
            prompts,
            settings,
        }
    }

    /// Decide on one natural-language request
    pub async fn mediate(
        &self,
        tenant: &str,
        user_id: &str,
        request: &str,
        history: &[Value],
    ) -> Decision {
        let decision = self.run(tenant, user_id, request, history).await;

        metrics::counter!("querygate_decisions_total", "decision" => decision.kind.as_str())
            .increment(1);
        match decision.kind {
            DecisionKind::Deny => info!(
                tenant,
                user_id,
                decision = %decision.kind,
                reason = decision.reason.as_deref().unwrap_or_default(),
                "Request mediated"
            ),
            _ => info!(tenant, user_id, decision = %decision.kind, "Request mediated"),
        }
        decision
    }

    async fn run(&self, tenant: &str, user_id: &str, request: &str, history: &[Value]) -> Decision {
        // 1. Identity
        let tenant = match TenantId::parse(tenant) {
            Ok(tenant) => tenant,
            Err(e) => {
                debug!("Rejecting tenant id: {}", e);
                return Decision::deny(IDENTITY_NOT_FOUND);
            }
        };
        let Some(user) = self.cache.user(&tenant, user_id).await else {
            return Decision::deny(IDENTITY_NOT_FOUND);
        };
        let user = match serde_json::to_value(&user) {
            Ok(user) => user,
            Err(e) => return Decision::deny(format!("LLM parsing failed: {}", e)),
        };

        // 2. Intent
        let schema = self.schema_description(&tenant).await;
        let intent = match self.parse_intent(&schema, request, &user, history).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(tenant = %tenant, "Intent parsing failed: {}", e);
                return Decision::deny(format!("LLM parsing failed: {}", e));
            }
        };
        debug!(tenant = %tenant, columns = ?intent.columns, "Intent parsed");

        let input = json!({
            "user": user,
            "query_request": intent,
        });

        // 3 + 4. Policy and evaluation, never interleaved with a write
        let raw_verdict = {
            let _lease = self.coordinator.read_lease(&tenant).await;

            let policy = self.cache.compiled_policy(&tenant).await;
            if policy.trim().is_empty() {
                return Decision::deny(POLICY_NOT_FOUND);
            }

            match self.evaluate(&tenant, &policy, &input).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(tenant = %tenant, "Evaluation failed: {}", e);
                    return Decision::deny(format!("OPA evaluation failed: {}", e));
                }
            }
        };
        let verdict = match EvaluationVerdict::from_value(&raw_verdict) {
            Ok(verdict) => verdict,
            Err(e) => return Decision::deny(format!("OPA evaluation failed: {}", e)),
        };

        // 5. Decision
        match verdict.classify(&intent.columns) {
            DecisionKind::Deny => {
                let reason = verdict.reason.trim();
                Decision::deny(if reason.is_empty() { DEFAULT_DENY_REASON } else { reason })
            }
            DecisionKind::Allow => Decision::allow(request, raw_verdict),
            DecisionKind::Rewrite => match self.rewrite(&schema, request, &verdict).await {
                Ok(rewritten) => Decision::rewrite(rewritten, raw_verdict),
                Err(e) => {
                    warn!(tenant = %tenant, "Rewrite failed: {}", e);
                    Decision::deny(format!("Query rewrite failed: {}", e))
                }
            },
        }
    }

    /// Tenant schema text, or the built-in employees table
    async fn schema_description(&self, tenant: &TenantId) -> String {
        match self.store.read(tenant, ArtifactKind::Schema).await {
            Ok(schema) if !schema.trim().is_empty() => schema,
            _ => DEFAULT_SCHEMA.to_string(),
        }
    }

    async fn parse_intent(
        &self,
        schema: &str,
        request: &str,
        user: &Value,
        history: &[Value],
    ) -> Result<QueryIntent, StageError> {
        let prompt = self
            .prompts
            .intent(schema, request, user, history)
            .map_err(|e| StageError::Prompt(e.to_string()))?;
        let reply = bounded::generate(self.oracle.as_ref(), &prompt, self.settings.oracle_timeout).await?;
        let object = reply_parser::extract_json_object(&reply)?;
        Ok(QueryIntent::from_value(Value::Object(object))?)
    }

    async fn evaluate(&self, tenant: &TenantId, policy: &str, input: &Value) -> Result<Value, StageError> {
        let limit = self.settings.evaluator_timeout;
        bounded::compile(self.evaluator.as_ref(), tenant, policy, limit).await?;
        Ok(bounded::evaluate(self.evaluator.as_ref(), &tenant.rule_path(), input, limit).await?)
    }

    async fn rewrite(
        &self,
        schema: &str,
        request: &str,
        verdict: &EvaluationVerdict,
    ) -> Result<String, StageError> {
        let prompt = self
            .prompts
            .rewrite(
                schema,
                request,
                &verdict.allowed_columns,
                &verdict.row_constraints.0,
                self.settings.rewrite_temperature,
            )
            .map_err(|e| StageError::Prompt(e.to_string()))?;
        let reply = bounded::generate(self.oracle.as_ref(), &prompt, self.settings.oracle_timeout).await?;
        Ok(reply_parser::clean_rewrite(&reply)?)
    }
}
