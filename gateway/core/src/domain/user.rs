// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserTableError {
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One principal's identity and attributes.
///
/// Serialized as-is into the evaluator input under `user`, so unknown
/// fields from the user table are kept in `extra` and forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,

    #[serde(default)]
    pub user_role: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parsed user table for one tenant, keyed by user id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserTable {
    users: HashMap<String, UserRecord>,
}

impl UserTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse newline-delimited JSON records. Blank lines are skipped; a later
    /// record with the same `user_id` replaces an earlier one.
    pub fn from_jsonl(content: &str) -> Result<Self, UserTableError> {
        let mut users = HashMap::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: UserRecord = serde_json::from_str(line)
                .map_err(|source| UserTableError::Malformed { line: index + 1, source })?;
            users.insert(record.user_id.clone(), record);
        }
        Ok(Self { users })
    }

    pub fn get(&self, user_id: &str) -> Option<&UserRecord> {
        self.users.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
