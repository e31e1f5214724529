// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Tenant identity and the closed set of per-tenant artifacts.
//
// A tenant id is used verbatim as a directory name under the data root and
// as the first segment of the tenant's policy package (`<id>.access`), so it
// is restricted to identifier characters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantIdError {
    #[error("tenant id cannot be empty")]
    Empty,

    #[error("tenant id '{0}' must not start with a digit")]
    LeadingDigit(String),

    #[error("tenant id '{0}' contains invalid character '{1}'")]
    InvalidCharacter(String, char),
}

/// Validated tenant / policy scope identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self, TenantIdError> {
        let raw = raw.trim();
        let first = raw.chars().next().ok_or(TenantIdError::Empty)?;
        if first.is_ascii_digit() {
            return Err(TenantIdError::LeadingDigit(raw.to_string()));
        }
        if let Some(bad) = raw.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(TenantIdError::InvalidCharacter(raw.to_string(), bad));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Policy package every compiled document for this tenant must declare
    pub fn policy_package(&self) -> String {
        format!("{}.access", self.0)
    }

    /// Rule path the evaluator is queried at
    pub fn rule_path(&self) -> String {
        format!("{}.access.result", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = TenantIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = TenantIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown artifact kind '{0}' (expected one of: sql, user_table, policy, rego)")]
pub struct UnknownArtifactKind(pub String);

/// The four artifacts making up a tenant's policy bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Free-text schema description (`db_schema.sql`)
    #[serde(rename = "sql")]
    Schema,

    /// Newline-delimited JSON user records (`employees.jsonl`)
    #[serde(rename = "user_table")]
    UserTable,

    /// Natural-language rules (`nl_policy.txt`)
    #[serde(rename = "policy")]
    NaturalLanguagePolicy,

    /// Evaluator-native compiled document (`policy.rego`)
    #[serde(rename = "rego")]
    CompiledPolicy,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Schema,
        ArtifactKind::UserTable,
        ArtifactKind::NaturalLanguagePolicy,
        ArtifactKind::CompiledPolicy,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Schema => "db_schema.sql",
            ArtifactKind::UserTable => "employees.jsonl",
            ArtifactKind::NaturalLanguagePolicy => "nl_policy.txt",
            ArtifactKind::CompiledPolicy => "policy.rego",
        }
    }

    /// Wire name used by the administrative surface
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Schema => "sql",
            ArtifactKind::UserTable => "user_table",
            ArtifactKind::NaturalLanguagePolicy => "policy",
            ArtifactKind::CompiledPolicy => "rego",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = UnknownArtifactKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sql" | "schema" => Ok(ArtifactKind::Schema),
            "user_table" => Ok(ArtifactKind::UserTable),
            "policy" | "nl_policy" => Ok(ArtifactKind::NaturalLanguagePolicy),
            "rego" | "compiled_policy" => Ok(ArtifactKind::CompiledPolicy),
            other => Err(UnknownArtifactKind(other.to_string())),
        }
    }
}
