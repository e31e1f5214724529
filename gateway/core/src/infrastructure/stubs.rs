// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scripted oracle and in-process evaluator.
//!
//! Deterministic stand-ins for the external collaborators, shared by the
//! unit and integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::application::prompts::Exchange;
use crate::domain::evaluator::{EvaluatorError, PolicyEvaluator};
use crate::domain::llm::{CompletionRequest, GenerationResponse, LLMError, LLMProvider};
use crate::domain::tenant::TenantId;

/// One scripted oracle answer
#[derive(Debug, Clone)]
pub enum OracleReply {
    Text(String),
    Fail(String),
    /// Never answers within any sensible deadline
    Hang,
}

impl OracleReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Oracle answering from per-exchange queues. The last reply of a queue is
/// repeated once the queue is drained; an exchange without a script fails.
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<Exchange, VecDeque<OracleReply>>>,
    log: Mutex<Vec<(Option<Exchange>, CompletionRequest)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, exchange: Exchange, replies: impl IntoIterator<Item = OracleReply>) -> Self {
        self.scripts
            .lock()
            .entry(exchange)
            .or_default()
            .extend(replies);
        self
    }

    pub fn reply(self, exchange: Exchange, text: impl Into<String>) -> Self {
        self.script(exchange, [OracleReply::text(text)])
    }

    pub fn calls(&self) -> usize {
        self.log.lock().len()
    }

    pub fn calls_for(&self, exchange: Exchange) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(e, _)| *e == Some(exchange))
            .count()
    }

    /// Requests received for one exchange, oldest first
    pub fn requests_for(&self, exchange: Exchange) -> Vec<CompletionRequest> {
        self.log
            .lock()
            .iter()
            .filter(|(e, _)| *e == Some(exchange))
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn next_reply(&self, exchange: Option<Exchange>) -> Option<OracleReply> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(&exchange?)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedOracle {
    async fn generate(&self, request: &CompletionRequest) -> Result<GenerationResponse, LLMError> {
        let exchange = Exchange::of(request);
        self.log.lock().push((exchange, request.clone()));

        match self.next_reply(exchange) {
            Some(OracleReply::Text(text)) => Ok(GenerationResponse::text_only(text, "scripted", "scripted")),
            Some(OracleReply::Fail(message)) => Err(LLMError::Provider(message)),
            Some(OracleReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LLMError::Provider("scripted hang elapsed".into()))
            }
            None => Err(LLMError::Provider(format!("no script for {:?}", exchange))),
        }
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

type Rule = dyn Fn(&str, &Value) -> Result<Value, EvaluatorError> + Send + Sync;

/// In-process evaluator: documents are stored per tenant and evaluated by a
/// caller-supplied rule receiving `(installed document, input)`. Documents
/// not starting with `package <tenant>.access` are rejected at compile time.
pub struct StubEvaluator {
    rule: Box<Rule>,
    installed: Mutex<HashMap<String, String>>,
    compiles: AtomicUsize,
    evaluations: AtomicUsize,
    delay: Option<Duration>,
}

impl StubEvaluator {
    pub fn new(
        rule: impl Fn(&str, &Value) -> Result<Value, EvaluatorError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            rule: Box::new(rule),
            installed: Mutex::new(HashMap::new()),
            compiles: AtomicUsize::new(0),
            evaluations: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Evaluator whose every answer is `verdict`
    pub fn constant(verdict: Value) -> Self {
        Self::new(move |_, _| Ok(verdict.clone()))
    }

    /// Delay every evaluation (for timeout tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.compiles() + self.evaluations()
    }

    pub fn installed(&self, tenant: &TenantId) -> Option<String> {
        self.installed.lock().get(tenant.as_str()).cloned()
    }
}

#[async_trait]
impl PolicyEvaluator for StubEvaluator {
    async fn compile(&self, tenant: &TenantId, document: &str) -> Result<(), EvaluatorError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let header = format!("package {}", tenant.policy_package());
        if !document.trim_start().starts_with(&header) {
            return Err(EvaluatorError::Compile(format!(
                "rego_parse_error: expected '{}'",
                header
            )));
        }
        self.installed
            .lock()
            .insert(tenant.to_string(), document.to_string());
        Ok(())
    }

    async fn evaluate(&self, rule_path: &str, input: &Value) -> Result<Value, EvaluatorError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let tenant = rule_path.split('.').next().unwrap_or_default();
        let document = self
            .installed
            .lock()
            .get(tenant)
            .cloned()
            .ok_or_else(|| EvaluatorError::MalformedResponse(format!("rule '{}' is undefined", rule_path)))?;
        (self.rule)(&document, input)
    }

    async fn health_check(&self) -> Result<(), EvaluatorError> {
        Ok(())
    }
}
