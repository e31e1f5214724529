// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Artifact Store Port
//!
//! Path/IO abstraction over a tenant's raw artifacts. No business logic:
//! the cache, the write coordinator and the synthesis loop are its only
//! consumers.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::tenant::{ArtifactKind, TenantId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("artifact {0} is not valid UTF-8")]
    InvalidEncoding(String),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stable location of an artifact (a filesystem path for the local
    /// store). Also used as the key for per-artifact load locks.
    fn locate(&self, tenant: &TenantId, kind: ArtifactKind) -> String;

    /// Read an artifact as text
    ///
    /// # Returns
    /// * `Err(StoreError::NotFound)` if the tenant or the artifact does not exist
    async fn read(&self, tenant: &TenantId, kind: ArtifactKind) -> Result<String, StoreError>;

    /// Read only the first line of an artifact (used for user-table samples)
    async fn read_first_line(
        &self,
        tenant: &TenantId,
        kind: ArtifactKind,
    ) -> Result<String, StoreError> {
        let content = self.read(tenant, kind).await?;
        Ok(content.lines().next().unwrap_or_default().to_string())
    }

    /// Replace an artifact's content, creating the tenant on first write.
    ///
    /// # Returns
    /// * `Ok(String)` - location of the written artifact
    async fn write(
        &self,
        tenant: &TenantId,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<String, StoreError>;

    /// Check health of storage backend
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Drop a leading UTF-8 byte order mark
pub fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom("\u{feff}package acme.access"), "package acme.access");
        assert_eq!(strip_bom("package acme.access"), "package acme.access");
    }
}
