// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end mediation scenarios.
//!
//! A tenant `acme` with a manager and a regular employee, a compiled policy
//! interpreted by an in-process evaluator, and a scripted oracle. Covers the
//! three decision kinds, the unknown-tenant short circuit and a policy
//! update becoming visible to the next request.

use querygate_core::application::prompts::Exchange;
use querygate_core::application::{MediationSettings, QueryGate, SynthesisSettings};
use querygate_core::domain::evaluator::EvaluatorError;
use querygate_core::domain::tenant::{ArtifactKind, TenantId};
use querygate_core::domain::verdict::DecisionKind;
use querygate_core::infrastructure::stubs::{ScriptedOracle, StubEvaluator};
use querygate_core::infrastructure::MockArtifactStore;
use serde_json::{json, Value};
use std::sync::Arc;

const USERS: &str = r#"{"user_id": "mgr_boss", "user_role": "manager", "attributes": {"department": "sales"}}
{"user_id": "emp_regular", "user_role": "employee", "attributes": {"department": "sales"}}
"#;

const SCHEMA: &str = "CREATE TABLE employees (id TEXT, name TEXT, department TEXT, salary INT);";

const POLICY_V1: &str = "package acme.access\n\nimport rego.v1\n# revision: 1\n";
const POLICY_V2: &str = "package acme.access\n\nimport rego.v1\n# revision: 2\n";

const ALL_COLUMNS: [&str; 4] = [
    "employees.id",
    "employees.name",
    "employees.department",
    "employees.salary",
];

/// Managers read everything; employees read only their own row, and are
/// refused when filtering on somebody else. Revision 2 locks employees out.
fn acme_policy(document: &str, input: &Value) -> Result<Value, EvaluatorError> {
    let user = &input["user"];
    let role = user["user_role"].as_str().unwrap_or_default();
    let user_id = user["user_id"].as_str().unwrap_or_default();

    let verdict = match role {
        "manager" => json!({
            "allowed": true,
            "allowed_columns": ALL_COLUMNS,
            "row_constraints": {},
            "reason": "Access granted for manager"
        }),
        "employee" if document.contains("revision: 2") => json!({
            "allowed": false,
            "allowed_columns": [],
            "row_constraints": {"deny": true},
            "reason": "Employees have no access"
        }),
        "employee" if input["query_request"]["conditions"]
            .get("employees.name")
            .is_some() =>
        {
            json!({
                "allowed": false,
                "allowed_columns": [],
                "row_constraints": {"deny": true},
                "reason": "Employee can only query self"
            })
        }
        "employee" => json!({
            "allowed": true,
            "allowed_columns": ["employees.name", "employees.department", "employees.salary"],
            "row_constraints": {"employees.id": user_id},
            "reason": "Employees see their own row"
        }),
        _ => json!({"allowed": false, "reason": "Unknown role"}),
    };
    Ok(verdict)
}

struct Harness {
    gate: QueryGate,
    store: Arc<MockArtifactStore>,
    oracle: Arc<ScriptedOracle>,
    evaluator: Arc<StubEvaluator>,
}

fn harness(oracle: ScriptedOracle) -> Harness {
    let tenant = TenantId::parse("acme").unwrap();
    let store = Arc::new(MockArtifactStore::new());
    store.insert(&tenant, ArtifactKind::UserTable, USERS);
    store.insert(&tenant, ArtifactKind::Schema, SCHEMA);
    store.insert(&tenant, ArtifactKind::NaturalLanguagePolicy, "Managers see everything.");
    store.insert(&tenant, ArtifactKind::CompiledPolicy, POLICY_V1);

    let oracle = Arc::new(oracle);
    let evaluator = Arc::new(StubEvaluator::new(acme_policy));
    let gate = QueryGate::new(
        store.clone(),
        oracle.clone(),
        evaluator.clone(),
        MediationSettings::default(),
        SynthesisSettings::default(),
    )
    .unwrap();

    Harness {
        gate,
        store,
        oracle,
        evaluator,
    }
}

fn intent(columns: &[&str], conditions: Value) -> String {
    json!({
        "tables": ["employees"],
        "columns": columns,
        "conditions": conditions,
        "query_type": "select"
    })
    .to_string()
}

#[tokio::test]
async fn test_manager_full_access_is_allowed() {
    let h = harness(ScriptedOracle::new().reply(Exchange::Intent, intent(&ALL_COLUMNS, json!({}))));

    let decision = h
        .gate
        .mediation
        .mediate("acme", "mgr_boss", "Show all employee records", &[])
        .await;

    assert_eq!(decision.kind, DecisionKind::Allow);
    assert_eq!(decision.rewritten_query.as_deref(), Some("Show all employee records"));
    assert_eq!(decision.opa_result.unwrap()["reason"], "Access granted for manager");
    assert_eq!(h.oracle.calls_for(Exchange::Rewrite), 0);
}

#[tokio::test]
async fn test_employee_own_salary_is_rewritten() {
    let h = harness(
        ScriptedOracle::new()
            .reply(
                Exchange::Intent,
                intent(&["employees.name", "employees.salary"], json!({})),
            )
            .reply(Exchange::Rewrite, "Show my name and salary where employee id is emp_regular"),
    );

    let decision = h
        .gate
        .mediation
        .mediate("acme", "emp_regular", "What is my salary?", &[])
        .await;

    assert_eq!(decision.kind, DecisionKind::Rewrite);
    assert_eq!(
        decision.rewritten_query.as_deref(),
        Some("Show my name and salary where employee id is emp_regular")
    );

    // The rewrite is told what the policy permits
    let rewrite = &h.oracle.requests_for(Exchange::Rewrite)[0];
    assert!(rewrite.user.contains("employees.salary"));
    assert!(rewrite.user.contains(r#""employees.id":"emp_regular""#));
}

#[tokio::test]
async fn test_employee_reading_colleague_is_denied() {
    let h = harness(ScriptedOracle::new().reply(
        Exchange::Intent,
        intent(
            &["employees.salary"],
            json!({"employees.name": [{"op": "=", "val": "Alice"}]}),
        ),
    ));

    let decision = h
        .gate
        .mediation
        .mediate("acme", "emp_regular", "What is Alice's salary?", &[])
        .await;

    assert_eq!(decision.kind, DecisionKind::Deny);
    assert_eq!(decision.reason.as_deref(), Some("Employee can only query self"));
    assert!(decision.rewritten_query.is_none());
}

#[tokio::test]
async fn test_unknown_tenant_touches_no_collaborator() {
    let h = harness(ScriptedOracle::new().reply(Exchange::Intent, intent(&ALL_COLUMNS, json!({}))));

    let decision = h
        .gate
        .mediation
        .mediate("initech", "mgr_boss", "Show all employee records", &[])
        .await;

    assert_eq!(decision.kind, DecisionKind::Deny);
    assert_eq!(decision.reason.as_deref(), Some("User or Policy ID not found."));
    assert_eq!(h.oracle.calls(), 0);
    assert_eq!(h.evaluator.calls(), 0);
}

#[tokio::test]
async fn test_policy_update_is_visible_to_next_request() {
    let h = harness(
        ScriptedOracle::new()
            .reply(
                Exchange::Intent,
                intent(&["employees.name", "employees.salary"], json!({})),
            )
            .reply(Exchange::Rewrite, "Show my name and salary")
            .reply(Exchange::Draft, format!("```rego\n{}```", POLICY_V2))
            .reply(Exchange::TestCases, "[]"),
    );

    let before = h
        .gate
        .mediation
        .mediate("acme", "emp_regular", "What is my salary?", &[])
        .await;
    assert_eq!(before.kind, DecisionKind::Rewrite);

    let report = h
        .gate
        .admin
        .update_policy("acme", ArtifactKind::NaturalLanguagePolicy, "Employees see nothing.")
        .await
        .unwrap();
    assert!(report.synthesis.unwrap().is_validated());

    let tenant = TenantId::parse("acme").unwrap();
    let committed = h.store.get(&tenant, ArtifactKind::CompiledPolicy).unwrap();
    assert!(committed.contains("revision: 2"));
    assert!(!committed.contains("```"));

    let after = h
        .gate
        .mediation
        .mediate("acme", "emp_regular", "What is my salary?", &[])
        .await;
    assert_eq!(after.kind, DecisionKind::Deny);
    assert_eq!(after.reason.as_deref(), Some("Employees have no access"));
    assert!(h.evaluator.installed(&tenant).unwrap().contains("revision: 2"));
}

#[tokio::test]
async fn test_oracle_outage_fails_closed() {
    let h = harness(ScriptedOracle::new());

    let decision = h
        .gate
        .mediation
        .mediate("acme", "mgr_boss", "Show all employee records", &[])
        .await;

    assert_eq!(decision.kind, DecisionKind::Deny);
    assert!(decision.reason.unwrap().starts_with("LLM parsing failed:"));
    assert_eq!(h.evaluator.calls(), 0);
}

#[tokio::test]
async fn test_decision_serializes_to_wire_shape() {
    let h = harness(ScriptedOracle::new().reply(Exchange::Intent, intent(&ALL_COLUMNS, json!({}))));

    let decision = h
        .gate
        .mediation
        .mediate("acme", "mgr_boss", "Show all employee records", &[])
        .await;
    let wire = serde_json::to_value(&decision).unwrap();

    assert_eq!(wire["decision"], "ALLOW");
    assert_eq!(wire["rewritten_query"], "Show all employee records");
    assert!(wire.get("reason").is_none());
    assert_eq!(wire["opa_result"]["allowed"], true);
}
