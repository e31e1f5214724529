// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Oracle and evaluator calls with a hard deadline.

use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

use crate::domain::evaluator::{EvaluatorError, PolicyEvaluator};
use crate::domain::llm::{CompletionRequest, LLMError, LLMProvider};
use crate::domain::tenant::TenantId;

/// Completion text, or `LLMError::Timeout` once `limit` elapses
pub async fn generate(
    oracle: &dyn LLMProvider,
    request: &CompletionRequest,
    limit: Duration,
) -> Result<String, LLMError> {
    match timeout(limit, oracle.generate(request)).await {
        Ok(result) => result.map(|response| response.text),
        Err(_) => Err(LLMError::Timeout(limit)),
    }
}

pub async fn compile(
    evaluator: &dyn PolicyEvaluator,
    tenant: &TenantId,
    document: &str,
    limit: Duration,
) -> Result<(), EvaluatorError> {
    match timeout(limit, evaluator.compile(tenant, document)).await {
        Ok(result) => result,
        Err(_) => Err(EvaluatorError::Timeout(limit)),
    }
}

pub async fn evaluate(
    evaluator: &dyn PolicyEvaluator,
    rule_path: &str,
    input: &Value,
    limit: Duration,
) -> Result<Value, EvaluatorError> {
    match timeout(limit, evaluator.evaluate(rule_path, input)).await {
        Ok(result) => result,
        Err(_) => Err(EvaluatorError::Timeout(limit)),
    }
}
