// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Per-tenant write serialization.
//
// Every mutation of a tenant's artifacts runs under the exclusive side of
// that tenant's lock. Mediation takes the shared side around policy
// resolution and evaluation, so it never observes a half-committed update
// nor evaluates while a synthesis run is pushing drafts to the evaluator.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

use crate::domain::store::{ArtifactStore, StoreError};
use crate::domain::tenant::{ArtifactKind, TenantId};

/// Exclusive hold on a tenant's artifact set
pub struct TenantWriteGuard {
    tenant: TenantId,
    store: Arc<dyn ArtifactStore>,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl TenantWriteGuard {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Write one artifact while the lock is held
    pub async fn write(&self, kind: ArtifactKind, content: &str) -> Result<String, StoreError> {
        let location = self.store.write(&self.tenant, kind, content).await?;
        debug!(tenant = %self.tenant, artifact = %kind, location = %location, "Artifact written");
        Ok(location)
    }

    /// Current content of an artifact, `None` if it does not exist yet
    pub async fn read_existing(&self, kind: ArtifactKind) -> Result<Option<String>, StoreError> {
        match self.store.read(&self.tenant, kind).await {
            Ok(content) => Ok(Some(content)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Shared lease held by readers of a tenant's compiled policy
pub struct TenantReadLease {
    _guard: OwnedRwLockReadGuard<()>,
}

pub struct WriteCoordinator {
    store: Arc<dyn ArtifactStore>,
    locks: DashMap<TenantId, Arc<RwLock<()>>>,
}

impl WriteCoordinator {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, tenant: &TenantId) -> Arc<RwLock<()>> {
        self.locks.entry(tenant.clone()).or_default().clone()
    }

    /// Take the tenant's exclusive lock; hold the guard for the whole
    /// composite update.
    pub async fn begin(&self, tenant: &TenantId) -> TenantWriteGuard {
        let guard = self.lock_for(tenant).write_owned().await;
        TenantWriteGuard {
            tenant: tenant.clone(),
            store: self.store.clone(),
            _guard: guard,
        }
    }

    /// Take a shared lease; blocks while a write to the tenant is in flight
    pub async fn read_lease(&self, tenant: &TenantId) -> TenantReadLease {
        TenantReadLease {
            _guard: self.lock_for(tenant).read_owned().await,
        }
    }

    /// Single-artifact write under the tenant lock
    pub async fn write_artifact(
        &self,
        tenant: &TenantId,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<String, StoreError> {
        self.begin(tenant).await.write(kind, content).await
    }
}
