// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Structured rendering of a natural-language data request.
//
// Conditions use the operator-list (AST) form: every field maps to a list of
// `{op, val}` clauses so that intervals and disjoint segments can be
// expressed. The legacy flat form (`"field": scalar`) does not deserialize.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const WILDCARD_COLUMN: &str = "*";

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("intent is not a JSON object")]
    NotAnObject,

    #[error("invalid intent structure: {0}")]
    Structure(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "LIKE", alias = "like")]
    Like,
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "BETWEEN", alias = "between")]
    Between,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: ConditionOp,
    pub val: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    #[serde(default)]
    pub tables: Vec<String>,

    /// Table-qualified column names, or the wildcard
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,

    #[serde(default)]
    pub conditions: BTreeMap<String, Vec<Condition>>,

    #[serde(default = "default_query_type")]
    pub query_type: String,
}

impl QueryIntent {
    /// Deserialize an oracle reply. Top-level nulls count as absent so the
    /// defaults apply.
    pub fn from_value(mut value: Value) -> Result<Self, IntentError> {
        let Some(object) = value.as_object_mut() else {
            return Err(IntentError::NotAnObject);
        };
        object.retain(|_, v| !v.is_null());
        let mut intent: QueryIntent = serde_json::from_value(value)?;
        if intent.columns.is_empty() {
            intent.columns = default_columns();
        }
        if intent.query_type.trim().is_empty() {
            intent.query_type = default_query_type();
        }
        Ok(intent)
    }
}

fn default_columns() -> Vec<String> {
    vec![WILDCARD_COLUMN.to_string()]
}

fn default_query_type() -> String {
    "select".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_list_conditions() {
        let intent = QueryIntent::from_value(json!({
            "tables": ["work_orders"],
            "columns": ["*"],
            "conditions": {
                "work_orders.status": [{"op": "=", "val": "completed"}],
                "work_orders.processed_at": [
                    {"op": "BETWEEN", "val": ["{{LAST_MONTH_START}}", "{{LAST_MONTH_END}}"]}
                ]
            },
            "query_type": "count"
        }))
        .unwrap();

        assert_eq!(intent.query_type, "count");
        assert_eq!(intent.columns, vec![WILDCARD_COLUMN.to_string()]);
        let processed = &intent.conditions["work_orders.processed_at"];
        assert_eq!(processed[0].op, ConditionOp::Between);
        assert_eq!(processed[0].val[0], "{{LAST_MONTH_START}}");
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let intent = QueryIntent::from_value(json!({"tables": ["employees"], "columns": [], "conditions": null})).unwrap();
        assert_eq!(intent.columns, vec!["*".to_string()]);
        assert_eq!(intent.query_type, "select");
        assert!(intent.conditions.is_empty());
    }

    #[test]
    fn test_flat_condition_form_is_rejected() {
        let result = QueryIntent::from_value(json!({
            "columns": ["employees.salary"],
            "conditions": {"employees.id": "emp001"}
        }));
        assert!(matches!(result, Err(IntentError::Structure(_))));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(
            QueryIntent::from_value(json!(["employees"])),
            Err(IntentError::NotAnObject)
        ));
    }
}
