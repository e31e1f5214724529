// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service assembly.
//
// One `QueryGate` owns the process-wide cache and lock maps; the mediation
// and administration services share them so that every administrative write
// is visible to the next mediated request.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::application::admin::PolicyAdminService;
use crate::application::cache::TenantCache;
use crate::application::mediation::{MediationService, MediationSettings};
use crate::application::prompts::PromptBook;
use crate::application::synthesis::{PolicySynthesizer, SynthesisSettings};
use crate::application::write_coordinator::WriteCoordinator;
use crate::domain::evaluator::PolicyEvaluator;
use crate::domain::gateway_config::GatewayConfigSpec;
use crate::domain::llm::LLMProvider;
use crate::domain::store::ArtifactStore;

pub struct QueryGate {
    pub mediation: Arc<MediationService>,
    pub admin: Arc<PolicyAdminService>,
    pub synthesizer: Arc<PolicySynthesizer>,
    pub cache: Arc<TenantCache>,
    pub coordinator: Arc<WriteCoordinator>,
}

impl QueryGate {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        oracle: Arc<dyn LLMProvider>,
        evaluator: Arc<dyn PolicyEvaluator>,
        mediation: MediationSettings,
        synthesis: SynthesisSettings,
    ) -> Result<Self> {
        let prompts = Arc::new(PromptBook::new().context("Failed to register prompt templates")?);
        let cache = Arc::new(TenantCache::new(store.clone()));
        let coordinator = Arc::new(WriteCoordinator::new(store.clone()));

        let synthesizer = Arc::new(PolicySynthesizer::new(
            store.clone(),
            oracle.clone(),
            evaluator.clone(),
            prompts.clone(),
            synthesis,
        ));
        let mediation = Arc::new(MediationService::new(
            cache.clone(),
            coordinator.clone(),
            store,
            oracle,
            evaluator,
            prompts,
            mediation,
        ));
        let admin = Arc::new(PolicyAdminService::new(
            coordinator.clone(),
            cache.clone(),
            synthesizer.clone(),
        ));

        Ok(Self {
            mediation,
            admin,
            synthesizer,
            cache,
            coordinator,
        })
    }

    /// Assemble with timeouts and budgets taken from the configuration
    pub fn from_config(
        spec: &GatewayConfigSpec,
        store: Arc<dyn ArtifactStore>,
        oracle: Arc<dyn LLMProvider>,
        evaluator: Arc<dyn PolicyEvaluator>,
    ) -> Result<Self> {
        Self::new(
            store,
            oracle,
            evaluator,
            MediationSettings::from_config(spec),
            SynthesisSettings::from_config(spec),
        )
    }
}
