// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Evaluator verdicts and the final mediation decision.
//
// `classify` is the single classification rule shared by the request-time
// pipeline and synthesis-time verification.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("evaluator reply doesn't contain 'allowed' field")]
    MissingAllowed,

    #[error("malformed verdict: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Row-level constraints returned by the evaluator.
///
/// Either an object of field filters (`{"id": "emp_regular"}`), an empty
/// object, or the deny flag `{"deny": true}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowConstraints(pub Value);

impl RowConstraints {
    /// True when there is nothing to filter on: null, `{}`, `[]`, `""`,
    /// `false` or zero.
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Number(n) => n.as_f64() == Some(0.0),
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    pub allowed: bool,

    #[serde(default)]
    pub allowed_columns: Vec<String>,

    #[serde(default)]
    pub row_constraints: RowConstraints,

    #[serde(default)]
    pub reason: String,
}

impl EvaluationVerdict {
    /// Parse an evaluator reply. The `allowed` member is mandatory.
    pub fn from_value(value: &Value) -> Result<Self, VerdictError> {
        if value.get("allowed").is_none() {
            return Err(VerdictError::MissingAllowed);
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Whether an allowed request must be rewritten before it is executed:
    /// the permitted column set differs from the requested one, or row
    /// constraints apply.
    pub fn needs_rewrite(&self, requested_columns: &[String]) -> bool {
        let allowed: BTreeSet<&str> = self.allowed_columns.iter().map(String::as_str).collect();
        let requested: BTreeSet<&str> = requested_columns.iter().map(String::as_str).collect();
        allowed != requested || !self.row_constraints.is_empty()
    }

    pub fn classify(&self, requested_columns: &[String]) -> DecisionKind {
        if !self.allowed {
            DecisionKind::Deny
        } else if self.needs_rewrite(requested_columns) {
            DecisionKind::Rewrite
        } else {
            DecisionKind::Allow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionKind {
    Allow,
    Deny,
    Rewrite,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Allow => "ALLOW",
            DecisionKind::Deny => "DENY",
            DecisionKind::Rewrite => "REWRITE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown decision '{0}' (expected ALLOW, DENY or REWRITE)")]
pub struct UnknownDecision(pub String);

/// Case-insensitive; oracles are inconsistent about casing
impl FromStr for DecisionKind {
    type Err = UnknownDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        [DecisionKind::Allow, DecisionKind::Deny, DecisionKind::Rewrite]
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownDecision(trimmed.to_string()))
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output of the mediation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "decision")]
    pub kind: DecisionKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Raw evaluator reply backing an ALLOW or REWRITE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opa_result: Option<Value>,
}

impl Decision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Deny,
            rewritten_query: None,
            reason: Some(reason.into()),
            opa_result: None,
        }
    }

    pub fn allow(query: impl Into<String>, raw_verdict: Value) -> Self {
        Self {
            kind: DecisionKind::Allow,
            rewritten_query: Some(query.into()),
            reason: None,
            opa_result: Some(raw_verdict),
        }
    }

    pub fn rewrite(query: impl Into<String>, raw_verdict: Value) -> Self {
        Self {
            kind: DecisionKind::Rewrite,
            rewritten_query: Some(query.into()),
            reason: None,
            opa_result: Some(raw_verdict),
        }
    }
}
