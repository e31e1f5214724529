// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tenant Read Cache
//!
//! Per-tenant cache of the parsed user table and the compiled policy text,
//! populated from the [`ArtifactStore`] on first use.
//!
//! Population uses double-checked locking: a miss takes a mutex keyed by the
//! artifact's store location, checks again, and only then reads. At most one
//! load per tenant per artifact kind is ever in flight and other tenants are
//! never blocked. A failed read or parse caches an empty value, so a broken
//! artifact fails closed instead of being re-read on every request.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::store::ArtifactStore;
use crate::domain::tenant::{ArtifactKind, TenantId};
use crate::domain::user::{UserRecord, UserTable};

pub struct TenantCache {
    store: Arc<dyn ArtifactStore>,
    user_tables: DashMap<TenantId, Arc<UserTable>>,
    policies: DashMap<TenantId, Arc<str>>,
    load_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TenantCache {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            user_tables: DashMap::new(),
            policies: DashMap::new(),
            load_locks: DashMap::new(),
        }
    }

    /// Parsed user table; empty when the tenant has none or it is unreadable
    pub async fn user_table(&self, tenant: &TenantId) -> Arc<UserTable> {
        self.get_or_load(&self.user_tables, tenant, ArtifactKind::UserTable, move || async move {
            match self.store.read(tenant, ArtifactKind::UserTable).await {
                Ok(content) => match UserTable::from_jsonl(&content) {
                    Ok(table) => Arc::new(table),
                    Err(e) => {
                        warn!(tenant = %tenant, "User table is malformed, caching empty table: {}", e);
                        Arc::new(UserTable::empty())
                    }
                },
                Err(e) => {
                    warn!(tenant = %tenant, "User table unavailable, caching empty table: {}", e);
                    Arc::new(UserTable::empty())
                }
            }
        })
        .await
    }

    /// Look up one user record
    pub async fn user(&self, tenant: &TenantId, user_id: &str) -> Option<UserRecord> {
        self.user_table(tenant).await.get(user_id).cloned()
    }

    /// Compiled policy text; empty when the tenant has none or it is unreadable
    pub async fn compiled_policy(&self, tenant: &TenantId) -> Arc<str> {
        self.get_or_load(&self.policies, tenant, ArtifactKind::CompiledPolicy, move || async move {
            match self.store.read(tenant, ArtifactKind::CompiledPolicy).await {
                Ok(content) => Arc::from(content),
                Err(e) => {
                    warn!(tenant = %tenant, "Compiled policy unavailable, caching empty policy: {}", e);
                    Arc::from("")
                }
            }
        })
        .await
    }

    /// Drop both cached artifacts of a tenant.
    ///
    /// Waits for any in-flight load of the tenant to finish first, so a load
    /// that read the previous content cannot repopulate the cache afterwards.
    pub async fn invalidate(&self, tenant: &TenantId) {
        for kind in [ArtifactKind::UserTable, ArtifactKind::CompiledPolicy] {
            let lock = self.load_lock(tenant, kind);
            let _guard = lock.lock().await;
            match kind {
                ArtifactKind::UserTable => {
                    self.user_tables.remove(tenant);
                }
                _ => {
                    self.policies.remove(tenant);
                }
            }
        }
        debug!(tenant = %tenant, "Cache invalidated");
    }

    /// Tenants with at least one cached artifact
    pub fn cached_tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self
            .user_tables
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.policies.iter().map(|entry| entry.key().clone()))
            .collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    fn load_lock(&self, tenant: &TenantId, kind: ArtifactKind) -> Arc<Mutex<()>> {
        self.load_locks
            .entry(self.store.locate(tenant, kind))
            .or_default()
            .clone()
    }

    async fn get_or_load<V, F, Fut>(
        &self,
        map: &DashMap<TenantId, V>,
        tenant: &TenantId,
        kind: ArtifactKind,
        load: F,
    ) -> V
    where
        V: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(hit) = map.get(tenant) {
            return hit.value().clone();
        }

        let lock = self.load_lock(tenant, kind);
        let _guard = lock.lock().await;

        if let Some(hit) = map.get(tenant) {
            return hit.value().clone();
        }

        let value = load().await;
        metrics::counter!("querygate_cache_loads_total", "artifact" => kind.as_str()).increment(1);
        debug!(tenant = %tenant, artifact = %kind, "Cache populated");
        map.insert(tenant.clone(), value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MockArtifactStore;

    fn setup() -> (Arc<MockArtifactStore>, TenantCache, TenantId) {
        let store = Arc::new(MockArtifactStore::new());
        let cache = TenantCache::new(store.clone());
        (store, cache, TenantId::parse("acme").unwrap())
    }

    #[tokio::test]
    async fn test_user_lookup_is_cached() {
        let (store, cache, tenant) = setup();
        store.insert(
            &tenant,
            ArtifactKind::UserTable,
            "{\"user_id\":\"alice\",\"user_role\":\"manager\"}\n",
        );

        assert_eq!(cache.user(&tenant, "alice").await.unwrap().user_role, "manager");
        assert!(cache.user(&tenant, "bob").await.is_none());
        assert_eq!(store.read_count(&tenant, ArtifactKind::UserTable), 1);
        assert_eq!(cache.cached_tenants(), vec![tenant]);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_artifacts_cache_empty() {
        let (store, cache, tenant) = setup();
        store.insert(&tenant, ArtifactKind::UserTable, "not json");

        assert!(cache.user_table(&tenant).await.is_empty());
        assert!(cache.compiled_policy(&tenant).await.is_empty());
        assert!(cache.compiled_policy(&tenant).await.is_empty());
        assert_eq!(store.read_count(&tenant, ArtifactKind::CompiledPolicy), 1);
    }

    #[tokio::test]
    async fn test_invalidate_reloads() {
        let (store, cache, tenant) = setup();
        store.insert(&tenant, ArtifactKind::CompiledPolicy, "package acme.access # v1");
        assert_eq!(&*cache.compiled_policy(&tenant).await, "package acme.access # v1");

        store.insert(&tenant, ArtifactKind::CompiledPolicy, "package acme.access # v2");
        assert_eq!(&*cache.compiled_policy(&tenant).await, "package acme.access # v1");

        cache.invalidate(&tenant).await;
        assert!(cache.cached_tenants().is_empty());
        assert_eq!(&*cache.compiled_policy(&tenant).await, "package acme.access # v2");
        assert_eq!(store.read_count(&tenant, ArtifactKind::CompiledPolicy), 2);
    }
}
