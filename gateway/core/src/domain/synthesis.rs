// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::domain::intent::WILDCARD_COLUMN;
use crate::domain::verdict::DecisionKind;

/// Synthetic request used to verify a compiled policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub description: String,

    #[serde(default)]
    pub user_role: String,

    #[serde(default = "default_test_user")]
    pub user_id: String,

    #[serde(default)]
    pub mock_user_attributes: Map<String, Value>,

    #[serde(default = "default_query_columns")]
    pub query_columns: Vec<String>,

    #[serde(deserialize_with = "decision_any_case")]
    pub expected_decision: DecisionKind,
}

impl TestCase {
    /// Evaluator input simulating this case, shaped like a live request
    pub fn evaluation_input(&self) -> Value {
        json!({
            "user": {
                "user_id": self.user_id,
                "user_role": self.user_role,
                "attributes": self.mock_user_attributes,
            },
            "query_request": {
                "columns": self.query_columns,
            }
        })
    }
}

fn decision_any_case<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DecisionKind, D::Error> {
    String::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

fn default_test_user() -> String {
    "test".to_string()
}

fn default_query_columns() -> Vec<String> {
    vec![WILDCARD_COLUMN.to_string()]
}

/// One verification failure fed back to the repair step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Case description; absent when the whole draft failed to compile
    pub case: Option<String>,
    pub expected: Option<DecisionKind>,
    pub actual: Option<DecisionKind>,
    pub verdict: Option<Value>,
    pub detail: String,
}

impl FailureReport {
    pub fn compile_error(detail: impl Into<String>) -> Self {
        Self {
            case: None,
            expected: None,
            actual: None,
            verdict: None,
            detail: format!("Compilation error (syntax invalid): {}", detail.into()),
        }
    }

    pub fn mismatch(case: &TestCase, actual: DecisionKind, verdict: Value) -> Self {
        let reason = verdict.get("reason").and_then(Value::as_str).unwrap_or_default().to_string();
        Self {
            case: Some(case.description.clone()),
            expected: Some(case.expected_decision),
            actual: Some(actual),
            verdict: Some(verdict),
            detail: reason,
        }
    }

    pub fn execution_error(case: &TestCase, detail: impl Into<String>) -> Self {
        Self {
            case: Some(case.description.clone()),
            expected: Some(case.expected_decision),
            actual: None,
            verdict: None,
            detail: format!("execution error: {}", detail.into()),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.case, self.expected, self.actual) {
            (Some(case), Some(expected), Some(actual)) => {
                write!(f, "Case '{}': expected {}, got {}.", case, expected, actual)?;
                if let Some(verdict) = &self.verdict {
                    write!(f, " Evaluator output: {}", verdict)?;
                }
                Ok(())
            }
            (Some(case), _, _) => write!(f, "Case '{}': {}", case, self.detail),
            _ => f.write_str(&self.detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisStatus {
    /// Every test case passed on the final attempt
    Validated,

    /// Retry budget exhausted; the last draft is returned unverified
    BestEffort { remaining_failures: Vec<FailureReport> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutcome {
    pub document: String,
    pub attempts: u32,
    pub test_cases: usize,
    #[serde(flatten)]
    pub status: SynthesisStatus,
}

impl SynthesisOutcome {
    pub fn is_validated(&self) -> bool {
        matches!(self.status, SynthesisStatus::Validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> TestCase {
        serde_json::from_value(json!({
            "description": "employee reads own salary",
            "user_role": "employee",
            "query_columns": ["employees.name", "employees.salary"],
            "expected_decision": "REWRITE"
        }))
        .unwrap()
    }

    #[test]
    fn test_case_defaults_and_input_shape() {
        let case = case();
        assert_eq!(case.user_id, "test");
        let input = case.evaluation_input();
        assert_eq!(input["user"]["user_role"], "employee");
        assert_eq!(input["user"]["attributes"], json!({}));
        assert_eq!(input["query_request"]["columns"][1], "employees.salary");
    }

    #[test]
    fn test_expected_decision_ignores_case() {
        for (raw, expected) in [("allow", DecisionKind::Allow), ("Deny", DecisionKind::Deny), (" rewrite ", DecisionKind::Rewrite)] {
            let case: TestCase = serde_json::from_value(json!({
                "description": "casing",
                "expected_decision": raw
            }))
            .unwrap();
            assert_eq!(case.expected_decision, expected);
        }

        let unknown = serde_json::from_value::<TestCase>(json!({
            "description": "bad",
            "expected_decision": "MAYBE"
        }));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_failure_report_rendering() {
        let report = FailureReport::mismatch(
            &case(),
            DecisionKind::Deny,
            json!({"allowed": false, "reason": "no role"}),
        );
        let text = report.to_string();
        assert!(text.starts_with("Case 'employee reads own salary': expected REWRITE, got DENY."));
        assert_eq!(report.detail, "no role");

        let compile = FailureReport::compile_error("rego_parse_error: unexpected eof");
        assert!(compile.to_string().contains("unexpected eof"));
        assert!(compile.case.is_none());
    }
}
