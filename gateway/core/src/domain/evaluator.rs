// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Policy Evaluator Domain Interface (Anti-Corruption Layer)
//
// The evaluator is an opaque rule engine: it accepts a compiled policy
// document per tenant and answers queries at a rule path with a structured
// verdict. The OPA REST adapter lives in infrastructure/opa_client.rs.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::domain::tenant::TenantId;

#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Install `document` as the tenant's policy. Syntax or compile errors
    /// are reported as `EvaluatorError::Compile`.
    async fn compile(&self, tenant: &TenantId, document: &str) -> Result<(), EvaluatorError>;

    /// Evaluate the rule at `rule_path` (dot separated, e.g.
    /// `acme.access.result`) against `input`, returning the rule's value.
    async fn evaluate(&self, rule_path: &str, input: &Value) -> Result<Value, EvaluatorError>;

    /// Check if the evaluator is reachable
    async fn health_check(&self) -> Result<(), EvaluatorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Policy compilation rejected: {0}")]
    Compile(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed evaluator response: {0}")]
    MalformedResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}
