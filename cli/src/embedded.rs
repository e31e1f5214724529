// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process gateway
//!
//! Builds the adapters named by the configuration and assembles the
//! services around them.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use querygate_core::{
    application::QueryGate,
    domain::{evaluator::PolicyEvaluator, gateway_config::GatewayConfigManifest, store::ArtifactStore},
    infrastructure::{
        llm::ProviderRegistry,
        storage::{create_artifact_store, StorageBackend},
        OpaClient,
    },
};

pub struct EmbeddedGateway {
    pub config: GatewayConfigManifest,
    pub gate: QueryGate,
    pub store: Arc<dyn ArtifactStore>,
    pub registry: Arc<ProviderRegistry>,
    pub evaluator: Arc<OpaClient>,
}

impl EmbeddedGateway {
    pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = GatewayConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        config
            .validate()
            .context("Configuration validation failed")?;

        let store = create_artifact_store(StorageBackend::Local {
            data_dir: config.spec.storage.data_dir.clone(),
        })
        .context("Failed to open artifact store")?;

        let registry = Arc::new(
            ProviderRegistry::from_config(&config.spec).context("Failed to initialize LLM providers")?,
        );
        let evaluator = Arc::new(OpaClient::new(config.spec.evaluator.url.clone()));

        let gate = QueryGate::from_config(
            &config.spec,
            store.clone(),
            registry.clone(),
            evaluator.clone() as Arc<dyn PolicyEvaluator>,
        )?;

        info!(
            data_dir = %config.spec.storage.data_dir.display(),
            evaluator = %evaluator.base_url(),
            "Gateway services initialized"
        );

        Ok(Self {
            config,
            gate,
            store,
            registry,
            evaluator,
        })
    }
}
