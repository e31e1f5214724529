// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Storage Infrastructure Module
//!
//! Concrete implementations of the [`ArtifactStore`] port.

pub mod local;

pub use local::LocalArtifactStore;

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::store::{ArtifactStore, StoreError};

/// Storage backend configuration
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// One directory per tenant under `data_dir`
    Local { data_dir: PathBuf },

    /// In-memory store for unit testing
    Mock,
}

/// Factory function to create an artifact store from configuration
pub fn create_artifact_store(backend: StorageBackend) -> Result<Arc<dyn ArtifactStore>, StoreError> {
    match backend {
        StorageBackend::Local { data_dir } => Ok(Arc::new(LocalArtifactStore::new(data_dir)?)),
        StorageBackend::Mock => Ok(Arc::new(MockArtifactStore::new())),
    }
}

pub use mock::MockArtifactStore;

mod mock {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use crate::domain::store::{strip_bom, ArtifactStore, StoreError};
    use crate::domain::tenant::{ArtifactKind, TenantId};

    /// In-memory artifact store that counts reads and can be told to fail
    /// writes of a given artifact kind.
    #[derive(Default)]
    pub struct MockArtifactStore {
        artifacts: Mutex<HashMap<(TenantId, ArtifactKind), String>>,
        reads: Mutex<HashMap<(TenantId, ArtifactKind), usize>>,
        failing_writes: Mutex<HashSet<ArtifactKind>>,
        read_delay: Option<Duration>,
    }

    impl MockArtifactStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every read take at least `delay`
        pub fn with_read_delay(mut self, delay: Duration) -> Self {
            self.read_delay = Some(delay);
            self
        }

        /// Seed an artifact without going through `write`
        pub fn insert(&self, tenant: &TenantId, kind: ArtifactKind, content: impl Into<String>) {
            self.artifacts
                .lock()
                .insert((tenant.clone(), kind), content.into());
        }

        pub fn get(&self, tenant: &TenantId, kind: ArtifactKind) -> Option<String> {
            self.artifacts.lock().get(&(tenant.clone(), kind)).cloned()
        }

        /// Number of `read` calls that reached this store for an artifact
        pub fn read_count(&self, tenant: &TenantId, kind: ArtifactKind) -> usize {
            self.reads
                .lock()
                .get(&(tenant.clone(), kind))
                .copied()
                .unwrap_or(0)
        }

        pub fn fail_writes(&self, kind: ArtifactKind, fail: bool) {
            let mut failing = self.failing_writes.lock();
            if fail {
                failing.insert(kind);
            } else {
                failing.remove(&kind);
            }
        }
    }

    #[async_trait]
    impl ArtifactStore for MockArtifactStore {
        fn locate(&self, tenant: &TenantId, kind: ArtifactKind) -> String {
            format!("mem://{}/{}", tenant, kind.file_name())
        }

        async fn read(&self, tenant: &TenantId, kind: ArtifactKind) -> Result<String, StoreError> {
            *self.reads.lock().entry((tenant.clone(), kind)).or_insert(0) += 1;
            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            self.artifacts
                .lock()
                .get(&(tenant.clone(), kind))
                .map(|content| strip_bom(content).to_string())
                .ok_or_else(|| StoreError::NotFound(self.locate(tenant, kind)))
        }

        async fn write(
            &self,
            tenant: &TenantId,
            kind: ArtifactKind,
            content: &str,
        ) -> Result<String, StoreError> {
            if self.failing_writes.lock().contains(&kind) {
                return Err(StoreError::IoError(format!(
                    "injected write failure for {}",
                    self.locate(tenant, kind)
                )));
            }
            self.insert(tenant, kind, content);
            Ok(self.locate(tenant, kind))
        }
    }
}
