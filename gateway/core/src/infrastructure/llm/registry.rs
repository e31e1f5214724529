// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Oracle Provider Registry
//
// Every configured model alias becomes a route to an adapter bound to that
// model. Calls go through an attempt plan: the alias's provider up to the
// configured number of attempts with exponential backoff between them, then
// the fallback provider once. The registry implements LLMProvider itself so
// the application layer only ever sees the default alias.

use crate::domain::gateway_config::{GatewayConfigSpec, LLMProviderConfig};
use crate::domain::llm::{CompletionRequest, GenerationResponse, LLMError, LLMProvider};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

/// Where an alias sends its requests
struct Route {
    provider: String,
    model: String,
    adapter: Arc<dyn LLMProvider>,
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Pause after the given 1-based failed attempt
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Routes oracle calls by model alias
pub struct ProviderRegistry {
    routes: BTreeMap<String, Route>,
    /// Provider name to the adapter for its first model; used for fallback and health
    providers: BTreeMap<String, Arc<dyn LLMProvider>>,
    default_alias: String,
    fallback_provider: Option<String>,
    retry: RetryPolicy,
}

impl ProviderRegistry {
    /// Build adapters for every enabled provider in the gateway configuration.
    ///
    /// A provider that cannot be built (unknown type, unset key variable) is
    /// logged and skipped; the rest of the registry still comes up.
    pub fn from_config(config: &GatewayConfigSpec) -> anyhow::Result<Self> {
        let mut routes = BTreeMap::new();
        let mut providers = BTreeMap::new();

        for provider_config in config.llm_providers.iter().filter(|p| p.enabled) {
            match build_routes(provider_config) {
                Ok(built) => {
                    if let Some(first) = built.first() {
                        providers.insert(provider_config.name.clone(), first.adapter.clone());
                    }
                    for (alias, route) in provider_config.models.iter().map(|m| &m.alias).zip(built) {
                        info!(
                            alias = %alias,
                            provider = %route.provider,
                            model = %route.model,
                            "Registered oracle route"
                        );
                        routes.insert(alias.clone(), route);
                    }
                }
                Err(e) => {
                    warn!(provider = %provider_config.name, error = %e, "Skipping oracle provider");
                }
            }
        }

        if routes.is_empty() {
            warn!("No oracle routes configured; mediation will deny every request");
        }

        Ok(Self {
            routes,
            providers,
            default_alias: config.llm_selection.default_alias.clone(),
            fallback_provider: config.llm_selection.fallback_provider.clone(),
            retry: RetryPolicy {
                attempts: config.llm_selection.max_retries.max(1),
                base_delay: Duration::from_millis(config.llm_selection.retry_delay_ms),
            },
        })
    }

    fn route(&self, alias: &str) -> Result<&Route, LLMError> {
        self.routes
            .get(alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", alias)))
    }

    /// Provider name and adapter for each attempt, in order
    fn attempt_plan<'a>(&'a self, route: &'a Route) -> Vec<(&'a str, &'a Arc<dyn LLMProvider>)> {
        let mut plan: Vec<_> = (0..self.retry.attempts)
            .map(|_| (route.provider.as_str(), &route.adapter))
            .collect();

        let fallback = self
            .fallback_provider
            .as_deref()
            .filter(|name| *name != route.provider)
            .and_then(|name| self.providers.get_key_value(name));
        if let Some((name, adapter)) = fallback {
            plan.push((name.as_str(), adapter));
        }
        plan
    }

    /// Complete a request through the route registered for `alias`
    pub async fn generate_with_alias(
        &self,
        alias: &str,
        request: &CompletionRequest,
    ) -> Result<GenerationResponse, LLMError> {
        let route = self.route(alias)?;
        let plan = self.attempt_plan(route);
        let total = plan.len();
        let mut last_error = None;

        for (index, (provider, adapter)) in plan.into_iter().enumerate() {
            let attempt = index as u32 + 1;
            if index > 0 {
                tokio::time::sleep(self.retry.backoff(index as u32)).await;
            }

            match adapter.generate(request).await {
                Ok(response) => {
                    debug!(alias, provider, attempt, "Oracle call succeeded");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(alias, provider, attempt, total, error = %e, "Oracle call failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Provider(format!("No attempts made for alias '{}'", alias))))
    }

    /// Health of every provider, keyed by provider name
    pub async fn health_check_all(&self) -> BTreeMap<String, Result<(), LLMError>> {
        let mut results = BTreeMap::new();
        for (name, adapter) in &self.providers {
            debug!(provider = %name, "Checking oracle provider health");
            results.insert(name.clone(), adapter.health_check().await);
        }
        results
    }

    /// Registered aliases in name order
    pub fn available_aliases(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }
}

#[async_trait]
impl LLMProvider for ProviderRegistry {
    async fn generate(&self, request: &CompletionRequest) -> Result<GenerationResponse, LLMError> {
        self.generate_with_alias(&self.default_alias, request).await
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        self.route(&self.default_alias)?.adapter.health_check().await
    }
}

/// One route per declared model, all sharing the provider's endpoint and key
fn build_routes(config: &LLMProviderConfig) -> anyhow::Result<Vec<Route>> {
    if config.models.is_empty() {
        anyhow::bail!("No models configured");
    }
    let api_key = resolve_secret(config.api_key.as_deref())?;

    config
        .models
        .iter()
        .map(|model| {
            let adapter: Arc<dyn LLMProvider> = match config.provider_type.as_str() {
                "openai" | "openai-compatible" => Arc::new(OpenAIAdapter::new(
                    config.endpoint.clone(),
                    api_key.clone(),
                    model.model.clone(),
                )),
                "ollama" => Arc::new(OllamaAdapter::new(config.endpoint.clone(), model.model.clone())),
                other => anyhow::bail!("Unsupported provider type: {}", other),
            };
            Ok(Route {
                provider: config.name.clone(),
                model: model.model.clone(),
                adapter,
            })
        })
        .collect()
}

/// Literal secret, or `env:NAME` read from the environment. Absent means no auth.
fn resolve_secret(value: Option<&str>) -> anyhow::Result<String> {
    match value {
        None => Ok(String::new()),
        Some(raw) => match raw.strip_prefix("env:") {
            Some(var) => std::env::var(var).map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var)),
            None => Ok(raw.to_string()),
        },
    }
}
