// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy Synthesis
//!
//! Compiles natural-language access rules into an evaluator document and
//! verifies it against oracle-generated test cases, repairing the draft
//! until every case passes or the attempt budget runs out.
//!
//! ```text
//! Draft ──▶ Verify ──(all pass)──▶ Done(Validated)
//!             │  ▲
//!   (failures)│  │(repaired draft)
//!             ▼  │
//!           Repair ──(budget exhausted)──▶ Done(BestEffort)
//! ```
//!
//! Test cases are generated once per run and reused unchanged on every
//! attempt. The loop never fails: without a usable draft it verifies and
//! repairs the built-in deny-all document.
//!
//! Verification installs drafts in the tenant's evaluator namespace, so
//! callers must hold the tenant's write guard for the whole run.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::bounded;
use crate::application::prompts::{deny_all_policy, PromptBook};
use crate::application::reply_parser;
use crate::domain::evaluator::PolicyEvaluator;
use crate::domain::gateway_config::GatewayConfigSpec;
use crate::domain::llm::LLMProvider;
use crate::domain::store::ArtifactStore;
use crate::domain::synthesis::{FailureReport, SynthesisOutcome, SynthesisStatus, TestCase};
use crate::domain::tenant::{ArtifactKind, TenantId};
use crate::domain::verdict::EvaluationVerdict;

const NO_SCHEMA: &str = "No schema";
const NO_USER_DATA: &str = "No user data";

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    /// Verification attempts per run, including the first
    pub max_attempts: u32,
    pub draft_temperature: f32,
    pub oracle_timeout: Duration,
    pub evaluator_timeout: Duration,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            draft_temperature: 0.0,
            oracle_timeout: Duration::from_secs(60),
            evaluator_timeout: Duration::from_secs(10),
        }
    }
}

impl SynthesisSettings {
    pub fn from_config(spec: &GatewayConfigSpec) -> Self {
        Self {
            max_attempts: spec.synthesis.max_attempts.max(1),
            draft_temperature: spec.synthesis.draft_temperature,
            oracle_timeout: spec.llm_selection.timeout(),
            evaluator_timeout: spec.evaluator.timeout(),
        }
    }
}

pub struct PolicySynthesizer {
    store: Arc<dyn ArtifactStore>,
    oracle: Arc<dyn LLMProvider>,
    evaluator: Arc<dyn PolicyEvaluator>,
    prompts: Arc<PromptBook>,
    settings: SynthesisSettings,
}

impl PolicySynthesizer {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        oracle: Arc<dyn LLMProvider>,
        evaluator: Arc<dyn PolicyEvaluator>,
        prompts: Arc<PromptBook>,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            evaluator,
            prompts,
            settings,
        }
    }

    /// Run the draft/verify/repair loop for `rules`
    pub async fn synthesize(&self, tenant: &TenantId, rules: &str) -> SynthesisOutcome {
        let schema = self.schema_text(tenant).await;
        let sample_user = self.sample_user(tenant).await;

        info!(tenant = %tenant, "Synthesizing policy");

        let mut draft = self.draft(tenant, &schema, &sample_user, rules).await;
        let cases = self.test_cases(tenant, &schema, rules).await;
        let max_attempts = self.settings.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics::counter!("querygate_synthesis_attempts_total").increment(1);

            let failures = self.verify(tenant, &draft, &cases).await;
            if failures.is_empty() {
                info!(tenant = %tenant, attempt, cases = cases.len(), "Policy validated");
                metrics::counter!("querygate_synthesis_runs_total", "status" => "validated").increment(1);
                return SynthesisOutcome {
                    document: draft,
                    attempts: attempt,
                    test_cases: cases.len(),
                    status: SynthesisStatus::Validated,
                };
            }

            debug!(tenant = %tenant, attempt, failures = failures.len(), "Verification failed");

            if attempt >= max_attempts {
                warn!(
                    tenant = %tenant,
                    attempts = attempt,
                    failures = failures.len(),
                    "Synthesis budget exhausted, keeping best-effort policy"
                );
                metrics::counter!("querygate_synthesis_runs_total", "status" => "best_effort").increment(1);
                return SynthesisOutcome {
                    document: draft,
                    attempts: attempt,
                    test_cases: cases.len(),
                    status: SynthesisStatus::BestEffort {
                        remaining_failures: failures,
                    },
                };
            }

            if let Some(repaired) = self.repair(tenant, rules, &draft, &failures).await {
                draft = repaired;
            }
        }
    }

    async fn schema_text(&self, tenant: &TenantId) -> String {
        match self.store.read(tenant, ArtifactKind::Schema).await {
            Ok(schema) if !schema.trim().is_empty() => schema,
            _ => NO_SCHEMA.to_string(),
        }
    }

    /// First row of the user table
    async fn sample_user(&self, tenant: &TenantId) -> String {
        match self.store.read_first_line(tenant, ArtifactKind::UserTable).await {
            Ok(line) if !line.trim().is_empty() => line.trim().to_string(),
            _ => NO_USER_DATA.to_string(),
        }
    }

    async fn draft(&self, tenant: &TenantId, schema: &str, sample_user: &str, rules: &str) -> String {
        let drafted = async {
            let prompt = self
                .prompts
                .draft(tenant, schema, sample_user, rules, self.settings.draft_temperature)?;
            let reply = bounded::generate(self.oracle.as_ref(), &prompt, self.settings.oracle_timeout).await?;
            anyhow::Ok(reply_parser::extract_policy_document(&reply)?)
        }
        .await;

        match drafted {
            Ok(document) => document,
            Err(e) => {
                warn!(tenant = %tenant, "Drafting failed, starting from deny-all policy: {}", e);
                deny_all_policy(tenant)
            }
        }
    }

    async fn test_cases(&self, tenant: &TenantId, schema: &str, rules: &str) -> Vec<TestCase> {
        let generated = async {
            let prompt = self
                .prompts
                .test_cases(schema, rules, self.settings.draft_temperature)?;
            let reply = bounded::generate(self.oracle.as_ref(), &prompt, self.settings.oracle_timeout).await?;
            anyhow::Ok(reply_parser::extract_json_array(&reply)?)
        }
        .await;

        let items = match generated {
            Ok(items) => items,
            Err(e) => {
                warn!(tenant = %tenant, "Test case generation failed, verifying compilation only: {}", e);
                return Vec::new();
            }
        };

        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<TestCase>(item) {
                Ok(case) => Some(case),
                Err(e) => {
                    warn!(tenant = %tenant, "Skipping malformed test case: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Compile `draft` and run every case against it
    async fn verify(&self, tenant: &TenantId, draft: &str, cases: &[TestCase]) -> Vec<FailureReport> {
        let limit = self.settings.evaluator_timeout;
        if let Err(e) = bounded::compile(self.evaluator.as_ref(), tenant, draft, limit).await {
            return vec![FailureReport::compile_error(e.to_string())];
        }

        let rule_path = tenant.rule_path();
        let mut failures = Vec::new();
        for case in cases {
            let raw = match bounded::evaluate(self.evaluator.as_ref(), &rule_path, &case.evaluation_input(), limit).await {
                Ok(raw) => raw,
                Err(e) => {
                    failures.push(FailureReport::execution_error(case, e.to_string()));
                    continue;
                }
            };
            match EvaluationVerdict::from_value(&raw) {
                Ok(verdict) => {
                    let actual = verdict.classify(&case.query_columns);
                    if actual != case.expected_decision {
                        failures.push(FailureReport::mismatch(case, actual, raw));
                    }
                }
                Err(e) => failures.push(FailureReport::execution_error(case, e.to_string())),
            }
        }
        failures
    }

    /// Repaired document, or `None` to keep the current draft
    async fn repair(
        &self,
        tenant: &TenantId,
        rules: &str,
        draft: &str,
        failures: &[FailureReport],
    ) -> Option<String> {
        let report = failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        let repaired = async {
            let prompt = self
                .prompts
                .repair(tenant, rules, draft, &report, self.settings.draft_temperature)?;
            let reply = bounded::generate(self.oracle.as_ref(), &prompt, self.settings.oracle_timeout).await?;
            anyhow::Ok(reply_parser::extract_policy_document(&reply)?)
        }
        .await;

        match repaired {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(tenant = %tenant, "Repair failed, keeping current draft: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::prompts::Exchange;
    use crate::domain::evaluator::EvaluatorError;
    use crate::infrastructure::storage::MockArtifactStore;
    use crate::infrastructure::stubs::{OracleReply, ScriptedOracle, StubEvaluator};
    use serde_json::{json, Value};

    const GOOD: &str = "package acme.access\n\nimport rego.v1\n# good\n";
    const BAD: &str = "package acme.access\n\nimport rego.v1\n# bad\n";

    const CASES: &str = r#"```json
[
  {"description": "manager sees all", "user_role": "manager", "query_columns": ["employees.name"], "expected_decision": "ALLOW"},
  {"description": "intern denied", "user_role": "intern", "query_columns": ["employees.name"], "expected_decision": "DENY"}
]
```"#;

    /// Verdicts depend on which marker the installed document carries
    fn marker_evaluator() -> StubEvaluator {
        StubEvaluator::new(|document: &str, input: &Value| {
            let role = input["user"]["user_role"].as_str().unwrap_or_default();
            let allowed = document.contains("# good") && role == "manager";
            Ok(json!({
                "allowed": allowed,
                "allowed_columns": ["employees.name"],
                "row_constraints": {},
                "reason": if allowed { "" } else { "not a manager" }
            }))
        })
    }

    fn synthesizer(
        oracle: ScriptedOracle,
        evaluator: StubEvaluator,
        max_attempts: u32,
    ) -> (PolicySynthesizer, Arc<ScriptedOracle>, Arc<StubEvaluator>, Arc<MockArtifactStore>) {
        let store = Arc::new(MockArtifactStore::new());
        let oracle = Arc::new(oracle);
        let evaluator = Arc::new(evaluator);
        let synthesizer = PolicySynthesizer::new(
            store.clone(),
            oracle.clone(),
            evaluator.clone(),
            Arc::new(PromptBook::new().unwrap()),
            SynthesisSettings {
                max_attempts,
                ..SynthesisSettings::default()
            },
        );
        (synthesizer, oracle, evaluator, store)
    }

    fn acme() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    #[tokio::test]
    async fn test_first_draft_validates() {
        let (synthesizer, oracle, evaluator, _) = synthesizer(
            ScriptedOracle::new()
                .reply(Exchange::Draft, format!("```rego\n{}```", GOOD))
                .reply(Exchange::TestCases, CASES),
            marker_evaluator(),
            5,
        );

        let outcome = synthesizer.synthesize(&acme(), "managers see everything").await;
        assert!(outcome.is_validated());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.test_cases, 2);
        assert!(outcome.document.contains("# good"));
        assert!(!outcome.document.contains("```"));
        assert_eq!(oracle.calls_for(Exchange::Repair), 0);
        assert_eq!(evaluator.compiles(), 1);
        assert_eq!(evaluator.evaluations(), 2);
    }

    #[tokio::test]
    async fn test_lowercase_expectations_are_still_checked() {
        let lowercase = CASES.replace("\"ALLOW\"", "\"allow\"").replace("\"DENY\"", "\"Deny\"");
        let (synthesizer, _, evaluator, _) = synthesizer(
            ScriptedOracle::new()
                .reply(Exchange::Draft, BAD)
                .reply(Exchange::TestCases, lowercase)
                .reply(Exchange::Repair, BAD),
            marker_evaluator(),
            1,
        );

        let outcome = synthesizer.synthesize(&acme(), "managers see everything").await;
        assert_eq!(outcome.test_cases, 2);
        assert_eq!(evaluator.evaluations(), 2);
        assert!(!outcome.is_validated());
    }

    #[tokio::test]
    async fn test_repair_converges() {
        let (synthesizer, oracle, _, _) = synthesizer(
            ScriptedOracle::new()
                .reply(Exchange::Draft, BAD)
                .reply(Exchange::TestCases, CASES)
                .script(Exchange::Repair, [OracleReply::text(BAD), OracleReply::text(GOOD)]),
            marker_evaluator(),
            5,
        );

        let outcome = synthesizer.synthesize(&acme(), "managers see everything").await;
        assert!(outcome.is_validated());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(oracle.calls_for(Exchange::TestCases), 1);

        let first_repair = &oracle.requests_for(Exchange::Repair)[0];
        assert!(first_repair.user.contains("Case 'manager sees all': expected ALLOW, got DENY."));
        assert!(first_repair.system.contains("acme.access"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_best_effort() {
        let (synthesizer, oracle, evaluator, _) = synthesizer(
            ScriptedOracle::new()
                .reply(Exchange::Draft, BAD)
                .reply(Exchange::TestCases, CASES)
                .reply(Exchange::Repair, BAD),
            marker_evaluator(),
            3,
        );

        let outcome = synthesizer.synthesize(&acme(), "managers see everything").await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(evaluator.compiles(), 3);
        // No repair after the final verification
        assert_eq!(oracle.calls_for(Exchange::Repair), 2);
        match outcome.status {
            SynthesisStatus::BestEffort { remaining_failures } => {
                assert_eq!(remaining_failures.len(), 1);
                assert_eq!(remaining_failures[0].case.as_deref(), Some("manager sees all"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(outcome.document, BAD.trim());
    }

    #[tokio::test]
    async fn test_oracle_failures_still_yield_a_document() {
        let (synthesizer, _, evaluator, _) = synthesizer(
            ScriptedOracle::new()
                .script(Exchange::Draft, [OracleReply::Fail("down".into())])
                .reply(Exchange::TestCases, "no idea")
                .reply(Exchange::Repair, "```\n```"),
            StubEvaluator::constant(json!({"allowed": false})),
            2,
        );

        let outcome = synthesizer.synthesize(&acme(), "nobody sees anything").await;
        assert_eq!(outcome.document, deny_all_policy(&acme()));
        assert_eq!(outcome.test_cases, 0);
        // No cases: compilation alone validates
        assert!(outcome.is_validated());
        assert_eq!(evaluator.installed(&acme()), Some(deny_all_policy(&acme())));
    }

    #[tokio::test]
    async fn test_compile_rejection_is_a_single_failure() {
        let (synthesizer, oracle, evaluator, _) = synthesizer(
            ScriptedOracle::new()
                .reply(Exchange::Draft, "package wrong.access\n")
                .reply(Exchange::TestCases, CASES)
                .reply(Exchange::Repair, "package wrong.access\n"),
            marker_evaluator(),
            2,
        );

        let outcome = synthesizer.synthesize(&acme(), "rules").await;
        assert_eq!(evaluator.evaluations(), 0);
        assert!(oracle.requests_for(Exchange::Repair)[0]
            .user
            .contains("Compilation error (syntax invalid)"));
        match outcome.status {
            SynthesisStatus::BestEffort { remaining_failures } => {
                assert_eq!(remaining_failures.len(), 1);
                assert!(remaining_failures[0].case.is_none());
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_evaluation_errors_are_reported_per_case() {
        let (synthesizer, _, _, _) = synthesizer(
            ScriptedOracle::new()
                .reply(Exchange::Draft, GOOD)
                .reply(Exchange::TestCases, CASES)
                .reply(Exchange::Repair, GOOD),
            StubEvaluator::new(|_, _| Err(EvaluatorError::MalformedResponse("no result".into()))),
            1,
        );

        let outcome = synthesizer.synthesize(&acme(), "rules").await;
        match outcome.status {
            SynthesisStatus::BestEffort { remaining_failures } => {
                assert_eq!(remaining_failures.len(), 2);
                assert!(remaining_failures[0].detail.starts_with("execution error"));
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_schema_and_sample_feed_the_draft_prompt() {
        let (synthesizer, oracle, _, store) = synthesizer(
            ScriptedOracle::new()
                .reply(Exchange::Draft, GOOD)
                .reply(Exchange::TestCases, "[]"),
            marker_evaluator(),
            1,
        );

        synthesizer.synthesize(&acme(), "rules").await;
        let first = &oracle.requests_for(Exchange::Draft)[0];
        assert!(first.user.contains(NO_SCHEMA) || first.system.contains(NO_SCHEMA));
        assert!(first.user.contains(NO_USER_DATA) || first.system.contains(NO_USER_DATA));

        store.insert(&acme(), ArtifactKind::Schema, "CREATE TABLE employees (id TEXT);");
        store.insert(
            &acme(),
            ArtifactKind::UserTable,
            "{\"user_id\":\"boss\",\"user_role\":\"manager\"}\n{\"user_id\":\"emp\",\"user_role\":\"employee\"}\n",
        );
        synthesizer.synthesize(&acme(), "rules").await;
        let second = &oracle.requests_for(Exchange::Draft)[1];
        let text = format!("{}{}", second.system, second.user);
        assert!(text.contains("CREATE TABLE employees"));
        assert!(text.contains("\"boss\""));
        assert!(!text.contains("\"emp\""));
    }
}
