//! Configuration snapshot
//!
//! Read-only view of provider / model / endpoint / mode definitions, loaded
//! from YAML. Providers (with their API keys) live in a separate secrets
//! document that is merged over the main one, mirroring the split between a
//! shareable config file and a credentials file that stays out of version
//! control.
//!
//! The snapshot is immutable once constructed; hosts that support hot reload
//! build a fresh snapshot and swap the `Arc`.

mod resolver;

pub use resolver::{ConfigResolver, ResolvedConfig};

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::Error;
use crate::types::{ApiFormat, AuthType, ContentKind, FileFormat, OperationMode, ResponseKind};

lazy_static! {
    static ref URL_RE: Regex = Regex::new(
        r"(?i)^https?://(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z]{2,6}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$"
    )
    .expect("static URL pattern");
}

/// Named credential / base-URL group that owns endpoints by reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub display_name: Option<String>,
    pub base_url: String,
    #[serde(default = "empty_secret")]
    pub api_key: SecretString,
    /// Provider-wide defaults, overridable per endpoint and per mode.
    #[serde(default)]
    pub file_format: Option<FileFormat>,
    #[serde(default)]
    pub file_field: Option<String>,
    #[serde(default)]
    pub auth_type: Option<AuthType>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

impl ProviderConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }
}

/// One network-reachable API target for a model.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Provider this endpoint belongs to (must exist in the snapshot).
    pub provider: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Lower number = preferred. Unset endpoints sort last.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub api_format: ApiFormat,
    #[serde(default)]
    pub auth_type: Option<AuthType>,
    /// Prepended to the prompt before building the request.
    #[serde(default)]
    pub prompt_prefix: Option<String>,
    /// Upstream model identifier (the logical model name is ours, not theirs).
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub file_format: Option<FileFormat>,
    #[serde(default)]
    pub file_field: Option<String>,
    /// Extra payload entries merged into every request (never overriding).
    #[serde(default)]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Operation-variant configs; the finest override level.
    #[serde(default)]
    pub modes: HashMap<OperationMode, ModeConfig>,
}

fn default_priority() -> i32 {
    999
}

impl EndpointConfig {
    /// Human-readable name used for manual selection and logging.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.provider)
    }
}

/// Mode-level configuration; every field here wins over endpoint and provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeConfig {
    /// Path appended to the provider base URL. Supports `{{model}}`.
    pub endpoint: String,
    #[serde(default)]
    pub content_type: Option<ContentKind>,
    #[serde(default)]
    pub response_path: Option<String>,
    #[serde(default)]
    pub response_kind: Option<ResponseKind>,
    #[serde(default)]
    pub task_id_path: Option<String>,
    #[serde(default)]
    pub polling_endpoint: Option<String>,
    #[serde(default)]
    pub status_path: Option<String>,
    #[serde(default)]
    pub success_value: Option<String>,
    #[serde(default)]
    pub file_format: Option<FileFormat>,
    #[serde(default)]
    pub file_field: Option<String>,
    /// Optional payload template rendered by the template engine.
    #[serde(default)]
    pub payload_template: Option<serde_json::Value>,
    /// Per-parameter value translation tables for the template engine.
    #[serde(default)]
    pub value_mappings: HashMap<String, HashMap<String, serde_json::Value>>,
    /// Baseline `generationConfig` for gemini-style endpoints.
    #[serde(default)]
    pub generation_config: serde_json::Map<String, serde_json::Value>,
}

/// A logical model: metadata plus its priority-ordered endpoint list.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub api_endpoints: Vec<EndpointConfig>,
}

/// Which endpoint the selector prefers when the caller does not pin one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStrategy {
    /// Highest priority first, advance on retryable failure.
    #[default]
    Failover,
    RoundRobin,
}

/// Global tunables with the same defaults the original deployment shipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_timeout: u64,
    pub max_retries: u32,
    pub retry_delay: f64,
    pub endpoint_strategy: EndpointStrategy,
    pub pricing_strategy: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timeout: 600,
            max_retries: 3,
            retry_delay: 1.0,
            endpoint_strategy: EndpointStrategy::Failover,
            pricing_strategy: "bestPrice".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawSnapshot {
    #[serde(default)]
    providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    models: HashMap<String, ModelConfig>,
    #[serde(default)]
    settings: Settings,
}

/// Immutable configuration snapshot consumed by the resolver and selector.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    providers: HashMap<String, ProviderConfig>,
    models: HashMap<String, ModelConfig>,
    settings: Settings,
}

impl ConfigSnapshot {
    /// Parse a snapshot from YAML. `secrets_yaml`, when given, contributes the
    /// entire `providers` section and replaces any providers in the main
    /// document.
    pub fn from_yaml(config_yaml: &str, secrets_yaml: Option<&str>) -> Result<Self, Error> {
        let mut raw: RawSnapshot = serde_yaml::from_str(config_yaml)
            .map_err(|e| Error::Config(format!("invalid config YAML: {e}")))?;

        if let Some(secrets) = secrets_yaml {
            #[derive(Deserialize)]
            struct Secrets {
                #[serde(default)]
                providers: HashMap<String, ProviderConfig>,
            }
            let secrets: Secrets = serde_yaml::from_str(secrets)
                .map_err(|e| Error::Config(format!("invalid secrets YAML: {e}")))?;
            if !secrets.providers.is_empty() {
                raw.providers = secrets.providers;
            }
        }

        Ok(Self {
            providers: raw.providers,
            models: raw.models,
            settings: raw.settings,
        })
    }

    /// Load a snapshot from files on disk.
    pub fn from_yaml_files(
        config_path: &std::path::Path,
        secrets_path: Option<&std::path::Path>,
    ) -> Result<Self, Error> {
        let config = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", config_path.display())))?;
        let secrets = match secrets_path {
            Some(p) => Some(
                std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("cannot read {}: {e}", p.display())))?,
            ),
            None => None,
        };
        Self::from_yaml(&config, secrets.as_deref())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(|k| k.as_str())
    }

    /// Endpoints for a model, sorted by priority (stable for equal priorities).
    pub fn endpoints_for(&self, model: &str) -> Result<Vec<&EndpointConfig>, Error> {
        let cfg = self
            .models
            .get(model)
            .ok_or_else(|| Error::Config(format!("unknown model '{model}'")))?;
        if cfg.api_endpoints.is_empty() {
            return Err(Error::Config(format!(
                "model '{model}' has no endpoints configured"
            )));
        }
        let mut eps: Vec<&EndpointConfig> = cfg.api_endpoints.iter().collect();
        eps.sort_by_key(|e| e.priority);
        Ok(eps)
    }

    /// Validate the snapshot. Returns human-readable problems; empty = valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.providers.is_empty() {
            errors.push("no providers configured".to_string());
        }
        for (name, provider) in &self.providers {
            if provider.base_url.is_empty() {
                errors.push(format!("provider '{name}': missing base_url"));
            } else if !URL_RE.is_match(&provider.base_url) {
                errors.push(format!(
                    "provider '{name}': invalid URL '{}'",
                    provider.base_url
                ));
            }
        }

        for (model, cfg) in &self.models {
            if cfg.api_endpoints.is_empty() {
                errors.push(format!("model '{model}': no api_endpoints configured"));
                continue;
            }
            for (idx, ep) in cfg.api_endpoints.iter().enumerate() {
                if ep.provider.is_empty() {
                    errors.push(format!("model '{model}' endpoint {idx}: missing provider"));
                } else if !self.providers.contains_key(&ep.provider) {
                    errors.push(format!(
                        "model '{model}' endpoint {idx}: provider '{}' not found",
                        ep.provider
                    ));
                }
                if ep.modes.is_empty() {
                    errors.push(format!("model '{model}' endpoint {idx}: no modes configured"));
                }
                for (mode, mode_cfg) in &ep.modes {
                    if mode_cfg.endpoint.is_empty() {
                        errors.push(format!(
                            "model '{model}' {}: missing endpoint path",
                            mode.as_str()
                        ));
                    }
                }
            }
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    //! Shared snapshot fixture used by unit tests across modules.

    use super::*;

    pub fn snapshot_yaml() -> &'static str {
        r#"
models:
  sketchwave:
    display_name: SketchWave
    api_endpoints:
      - provider: acme
        display_name: acme-primary
        priority: 1
        api_format: openai
        model_name: sketchwave-v1
        modes:
          text_to_asset:
            endpoint: /v1/images/generations
            response_path: data[*].url
          asset_to_asset:
            endpoint: /v1/images/edits
            content_type: multipart/form-data
      - provider: lumina
        priority: 2
        api_format: gemini
        prompt_prefix: "Generate an image: "
        model_name: lumina-flash
        extra_params:
          responseModalities: ["IMAGE"]
        modes:
          text_to_asset:
            endpoint: /v1beta/models/{{model}}:generateContent
settings:
  max_retries: 2
"#
    }

    pub fn secrets_yaml() -> &'static str {
        r#"
providers:
  acme:
    base_url: https://api.acme.test
    api_key: sk-acme
    file_format: numbered
  lumina:
    base_url: https://lumina.test/
    api_key: lm-123
    auth_type: none
"#
    }

    pub fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot::from_yaml(snapshot_yaml(), Some(secrets_yaml())).expect("fixture parses")
    }
}
