// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a QueryGate node, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Oracle (LLM) provider configuration and alias mapping
// - Retry, fallback and timeout policy for oracle calls
// - Policy evaluator endpoint
// - Artifact storage root
// - Synthesis loop budget
// - Logging settings

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "querygate/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "querygate/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    /// Gateway metadata (name, labels, version)
    pub metadata: ManifestMetadata,

    /// Gateway configuration specification
    pub spec: GatewayConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable gateway name
    pub name: String,

    /// Optional: Configuration version for tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Optional: Labels for categorization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    /// LLM provider configurations
    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    /// Alias selection, retries and timeouts
    #[serde(default)]
    pub llm_selection: LLMSelection,

    /// Policy evaluator endpoint
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// Artifact storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Policy synthesis loop
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Observability configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// Provider type
    #[serde(rename = "type")]
    pub provider_type: String, // "ollama", "openai", "openai-compatible"

    /// API endpoint URL
    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Whether this provider is active
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Available models on this provider
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model alias (e.g., "default", "fast")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Alias used for every oracle call
    #[serde(default = "default_alias")]
    pub default_alias: String,

    /// Fallback provider if primary fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    /// Maximum attempts per oracle call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds (doubled each attempt)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Upper bound for a single oracle call, retries included
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl LLMSelection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Base URL of the OPA-compatible evaluator
    #[serde(default = "default_evaluator_url")]
    pub url: String,

    /// Upper bound for a single evaluator call
    #[serde(default = "default_evaluator_timeout")]
    pub timeout_seconds: u64,
}

impl EvaluatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per tenant
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Verification attempts before the last draft is accepted unverified
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Temperature for drafting, test generation and repair
    #[serde(default)]
    pub draft_temperature: f32,

    /// Temperature for request rewriting
    #[serde(default = "default_rewrite_temperature")]
    pub rewrite_temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_alias() -> String {
    "default".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_evaluator_url() -> String {
    "http://localhost:8181".to_string()
}

fn default_evaluator_timeout() -> u64 {
    10
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/policy_list")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_rewrite_temperature() -> f32 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            default_alias: default_alias(),
            fallback_provider: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            url: default_evaluator_url(),
            timeout_seconds: default_evaluator_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            draft_temperature: 0.0,
            rewrite_temperature: default_rewrite_temperature(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for GatewayConfigSpec {
    fn default() -> Self {
        Self {
            llm_providers: vec![],
            llm_selection: LLMSelection::default(),
            evaluator: EvaluatorConfig::default(),
            storage: StorageConfig::default(),
            synthesis: SynthesisConfig::default(),
            observability: None,
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "querygate".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl LLMProviderConfig {
    /// Field-level checks; cross-provider rules live in the manifest validator
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.name.is_empty(), "LLM provider name cannot be empty");
        ensure!(
            !self.endpoint.is_empty(),
            "LLM provider '{}' has no endpoint",
            self.name
        );
        ensure!(
            !self.models.is_empty(),
            "LLM provider '{}' declares no models",
            self.name
        );
        for model in &self.models {
            ensure!(
                !model.alias.is_empty() && !model.model.is_empty(),
                "LLM provider '{}' has a model entry with an empty alias or model id",
                self.name
            );
        }
        Ok(())
    }
}

impl GatewayConfigManifest {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Locations searched when no path is given, highest precedence first
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(4);
        if let Some(path) = std::env::var_os("QUERYGATE_CONFIG_PATH") {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(PathBuf::from("./querygate-config.yaml"));
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".querygate").join("config.yaml"));
        }
        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/querygate/config.yaml"));
        #[cfg(windows)]
        candidates.push(PathBuf::from("C:\\ProgramData\\QueryGate\\config.yaml"));
        candidates
    }

    /// First existing file among [`Self::candidate_paths`]
    pub fn discover_config() -> Option<PathBuf> {
        Self::candidate_paths().into_iter().find(|path| path.exists())
    }

    /// An explicit path must load; otherwise the first discovered file is
    /// used, or built-in defaults when none exists. Environment overrides
    /// apply in every case.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match cli_path.or_else(Self::discover_config) {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading gateway configuration");
                Self::from_yaml_file(&path)?
            }
            None => {
                tracing::warn!("No gateway configuration found; using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// `QUERYGATE_OPA_URL`, `QUERYGATE_DATA_DIR` and
    /// `QUERYGATE_SYNTHESIS_MAX_ATTEMPTS` win over file values
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_override("QUERYGATE_OPA_URL") {
            self.spec.evaluator.url = url;
        }
        if let Some(dir) = env_override("QUERYGATE_DATA_DIR") {
            self.spec.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = env_override("QUERYGATE_SYNTHESIS_MAX_ATTEMPTS") {
            match raw.parse::<u32>() {
                Ok(attempts) if attempts > 0 => self.spec.synthesis.max_attempts = attempts,
                _ => tracing::warn!(value = %raw, "Ignoring QUERYGATE_SYNTHESIS_MAX_ATTEMPTS; expected a positive integer"),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.api_version == API_VERSION,
            "Invalid apiVersion '{}', expected '{}'",
            self.api_version,
            API_VERSION
        );
        ensure!(self.kind == KIND, "Invalid kind '{}', expected '{}'", self.kind, KIND);
        ensure!(!self.metadata.name.is_empty(), "metadata.name cannot be empty");

        let spec = &self.spec;
        let mut aliases = HashSet::new();
        for provider in &spec.llm_providers {
            provider.validate()?;
            if !provider.enabled {
                continue;
            }
            for model in &provider.models {
                ensure!(
                    aliases.insert(model.alias.as_str()),
                    "Model alias '{}' is declared by more than one enabled provider",
                    model.alias
                );
            }
        }

        let selection = &spec.llm_selection;
        ensure!(
            spec.llm_providers.is_empty() || aliases.contains(selection.default_alias.as_str()),
            "Default alias '{}' is not served by any enabled provider",
            selection.default_alias
        );
        if let Some(fallback) = &selection.fallback_provider {
            ensure!(
                spec.llm_providers.iter().any(|p| &p.name == fallback),
                "Fallback provider '{}' is not declared in llm_providers",
                fallback
            );
        }

        ensure!(selection.max_retries > 0, "llm_selection.max_retries must be at least 1");
        ensure!(
            selection.timeout_seconds > 0 && spec.evaluator.timeout_seconds > 0,
            "Oracle and evaluator timeouts must be greater than zero"
        );
        ensure!(!spec.evaluator.url.is_empty(), "evaluator.url cannot be empty");
        ensure!(spec.synthesis.max_attempts > 0, "synthesis.max_attempts must be at least 1");

        Ok(())
    }

    /// Logging settings, defaulted when the observability block is absent
    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }
}

fn env_override(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    tracing::info!(variable = name, value = %value, "Configuration overridden from environment");
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: querygate/v1
kind: GatewayConfig
metadata:
  name: test-gateway
spec:
  llm_providers:
    - name: local-qwen
      type: openai-compatible
      endpoint: http://localhost:7009/v1
      api_key: env:QUERYGATE_TEST_KEY
      models:
        - alias: default
          model: qwen2.5-14b-instruct
  llm_selection:
    timeout_seconds: 30
  evaluator:
    url: http://opa:8181
  synthesis:
    max_attempts: 3
"#;

    #[test]
    fn test_default_manifest() {
        let manifest = GatewayConfigManifest::default();
        assert_eq!(manifest.api_version, "querygate/v1");
        assert_eq!(manifest.kind, "GatewayConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert!(manifest.spec.llm_providers.is_empty());
        assert_eq!(manifest.spec.synthesis.max_attempts, 5);
        assert_eq!(manifest.spec.evaluator.url, "http://localhost:8181");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_sample_with_defaults() {
        let manifest = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(manifest.metadata.name, "test-gateway");
        assert_eq!(manifest.spec.llm_providers[0].provider_type, "openai-compatible");
        assert!(manifest.spec.llm_providers[0].enabled);
        assert_eq!(manifest.spec.llm_selection.timeout_seconds, 30);
        assert_eq!(manifest.spec.llm_selection.max_retries, 3);
        assert_eq!(manifest.spec.evaluator.timeout_seconds, 10);
        assert_eq!(manifest.spec.synthesis.max_attempts, 3);
        assert_eq!(manifest.spec.storage.data_dir, PathBuf::from("data/policy_list"));
        assert_eq!(manifest.logging().format, "text");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.llm_selection.default_alias = "smart".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.llm_selection.default_alias = "default".to_string();

        manifest.spec.llm_selection.fallback_provider = Some("missing".to_string());
        assert!(manifest.validate().is_err());
        manifest.spec.llm_selection.fallback_provider = None;

        manifest.spec.synthesis.max_attempts = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.synthesis.max_attempts = 5;

        manifest.spec.llm_providers.push(LLMProviderConfig {
            name: "duplicate".to_string(),
            provider_type: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            enabled: true,
            models: vec![ModelConfig {
                alias: "default".to_string(),
                model: "llama3.2".to_string(),
            }],
        });
        assert!(manifest.validate().is_err());

        manifest.spec.llm_providers[1].enabled = false;
        assert!(manifest.validate().is_ok());

        manifest.spec.llm_providers[1].models[0].model.clear();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(GatewayConfigManifest::load_or_default(Some(missing)).is_err());

        let present = dir.path().join("querygate-config.yaml");
        std::fs::write(&present, SAMPLE).unwrap();
        let manifest = GatewayConfigManifest::load_or_default(Some(present)).unwrap();
        assert_eq!(manifest.metadata.name, "test-gateway");
    }
}
