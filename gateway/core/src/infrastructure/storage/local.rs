// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Artifact Store
//!
//! Each tenant is a directory under the data root holding four files:
//!
//! ```text
//! <data_dir>/<tenant>/employees.jsonl
//! <data_dir>/<tenant>/db_schema.sql
//! <data_dir>/<tenant>/nl_policy.txt
//! <data_dir>/<tenant>/policy.rego
//! ```
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! reader sees either the old or the new content, never a torn file.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::store::{strip_bom, ArtifactStore, StoreError};
use crate::domain::tenant::{ArtifactKind, TenantId};

pub struct LocalArtifactStore {
    data_dir: PathBuf,
}

impl LocalArtifactStore {
    /// Create the store, creating `data_dir` if it does not exist
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();

        std::fs::create_dir_all(&data_dir).map_err(|e| {
            StoreError::IoError(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        Ok(Self { data_dir })
    }

    fn path_of(&self, tenant: &TenantId, kind: ArtifactKind) -> PathBuf {
        self.data_dir.join(tenant.as_str()).join(kind.file_name())
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn locate(&self, tenant: &TenantId, kind: ArtifactKind) -> String {
        self.path_of(tenant, kind).to_string_lossy().into_owned()
    }

    async fn read(&self, tenant: &TenantId, kind: ArtifactKind) -> Result<String, StoreError> {
        let path = self.path_of(tenant, kind);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(path.display().to_string()),
            _ => StoreError::IoError(format!("Failed to read {}: {}", path.display(), e)),
        })?;

        let content = String::from_utf8(bytes)
            .map_err(|_| StoreError::InvalidEncoding(path.display().to_string()))?;

        Ok(strip_bom(&content).to_string())
    }

    async fn write(
        &self,
        tenant: &TenantId,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<String, StoreError> {
        let tenant_dir = self.data_dir.join(tenant.as_str());
        tokio::fs::create_dir_all(&tenant_dir).await.map_err(|e| {
            StoreError::IoError(format!(
                "Failed to create tenant directory {}: {}",
                tenant_dir.display(),
                e
            ))
        })?;

        let path = tenant_dir.join(kind.file_name());
        let staging = tenant_dir.join(format!(".{}.tmp", kind.file_name()));

        tokio::fs::write(&staging, content.as_bytes())
            .await
            .map_err(|e| StoreError::IoError(format!("Failed to write {}: {}", staging.display(), e)))?;

        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StoreError::IoError(format!("Failed to replace {}: {}", path.display(), e)))?;

        Ok(path.display().to_string())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let metadata = tokio::fs::metadata(&self.data_dir)
            .await
            .map_err(|e| StoreError::IoError(format!("Data directory unavailable: {}", e)))?;

        if metadata.permissions().readonly() {
            return Err(StoreError::IoError(format!(
                "Data directory {} is read-only",
                self.data_dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tenant() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path()).unwrap();

        let location = store
            .write(&tenant(), ArtifactKind::CompiledPolicy, "package acme.access")
            .await
            .unwrap();
        assert!(location.ends_with("policy.rego"));
        assert!(temp_dir.path().join("acme").join("policy.rego").exists());
        assert!(!temp_dir.path().join("acme").join(".policy.rego.tmp").exists());

        let content = store.read(&tenant(), ArtifactKind::CompiledPolicy).await.unwrap();
        assert_eq!(content, "package acme.access");
    }

    #[tokio::test]
    async fn test_missing_tenant_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path()).unwrap();

        let result = store.read(&tenant(), ArtifactKind::Schema).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_strips_bom_and_first_line() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path()).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("acme")).unwrap();
        std::fs::write(
            temp_dir.path().join("acme").join("employees.jsonl"),
            "\u{feff}{\"user_id\":\"alice\"}\n{\"user_id\":\"bob\"}\n",
        )
        .unwrap();

        let first = store
            .read_first_line(&tenant(), ArtifactKind::UserTable)
            .await
            .unwrap();
        assert_eq!(first, "{\"user_id\":\"alice\"}");
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path()).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("acme")).unwrap();
        std::fs::write(temp_dir.path().join("acme").join("db_schema.sql"), [0xff, 0xfe, 0x00]).unwrap();

        let result = store.read(&tenant(), ArtifactKind::Schema).await;
        assert!(matches!(result, Err(StoreError::InvalidEncoding(_))));
    }

    #[tokio::test]
    async fn test_health_check() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path().join("nested")).unwrap();
        store.health_check().await.unwrap();
    }
}
