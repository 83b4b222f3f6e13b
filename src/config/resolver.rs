//! Config resolution
//!
//! Flattens the mode → endpoint → provider → system-default override
//! hierarchy into a [`ResolvedConfig`] exactly once per call. Downstream code
//! (request building, response parsing, the executor) only ever sees the
//! flattened view; the precedence walk is never re-derived at call sites.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use super::{ConfigSnapshot, EndpointConfig, ModeConfig};
use crate::error::Error;
use crate::types::{ApiFormat, AuthType, ContentKind, FileFormat, OperationMode, ResponseKind};

/// System defaults applied when no override level supplies a value.
mod defaults {
    pub const FILE_FIELD: &str = "image";
    pub const RESPONSE_PATH: &str = "data[0].url";
    pub const TASK_ID_PATH: &str = "task_id";
    pub const POLLING_ENDPOINT: &str = "/v1/tasks/{task_id}";
    pub const STATUS_PATH: &str = "data.status";
    pub const SUCCESS_VALUE: &str = "SUCCESS";
}

/// Flattened, immutable per-call configuration.
///
/// Invariant: every scalar knob holds a concrete value after resolution; no
/// "inherit" markers survive past this point.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub provider: String,
    pub endpoint_name: String,
    pub base_url: String,
    pub api_key: SecretString,
    pub api_format: ApiFormat,
    pub auth_type: AuthType,
    pub prompt_prefix: String,
    /// Upstream model identifier; empty when the endpoint does not remap.
    pub model_name: String,
    /// Mode actually resolved (after endpoint-level mode fallback).
    pub mode: OperationMode,
    pub endpoint_path: String,
    pub content_kind: ContentKind,
    pub response_path: String,
    pub response_kind: ResponseKind,
    pub task_id_path: String,
    pub polling_endpoint: String,
    pub status_path: String,
    pub success_value: String,
    pub file_format: FileFormat,
    pub file_field: String,
    pub payload_template: Option<serde_json::Value>,
    pub value_mappings: HashMap<String, HashMap<String, serde_json::Value>>,
    pub generation_config: serde_json::Map<String, serde_json::Value>,
    pub extra_params: serde_json::Map<String, serde_json::Value>,
    pub timeout: Duration,
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("provider", &self.provider)
            .field("endpoint_name", &self.endpoint_name)
            .field("base_url", &self.base_url)
            .field("api_key_present", &(!self.api_key.expose_secret().is_empty()))
            .field("api_format", &self.api_format)
            .field("auth_type", &self.auth_type)
            .field("mode", &self.mode)
            .field("endpoint_path", &self.endpoint_path)
            .field("content_kind", &self.content_kind)
            .field("file_format", &self.file_format)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ResolvedConfig {
    /// Full request URL, with the `{{model}}` placeholder substituted.
    pub fn request_url(&self, model_name: &str) -> String {
        let path = self.endpoint_path.replace("{{model}}", model_name);
        format!("{}{}", self.base_url, path)
    }
}

/// Resolves effective per-call parameters from a snapshot.
pub struct ConfigResolver;

impl ConfigResolver {
    /// Resolve the effective configuration for one (model, mode, endpoint)
    /// triple. Fails only when a *required* field (provider, base_url, mode
    /// endpoint path) is unresolvable at every level.
    pub fn resolve(
        snapshot: &ConfigSnapshot,
        model: &str,
        mode: OperationMode,
        endpoint: &EndpointConfig,
    ) -> Result<ResolvedConfig, Error> {
        let provider = snapshot.provider(&endpoint.provider).ok_or_else(|| {
            Error::Config(format!(
                "model '{model}': provider '{}' not found",
                endpoint.provider
            ))
        })?;
        if provider.base_url.is_empty() {
            return Err(Error::Config(format!(
                "provider '{}': missing base_url",
                endpoint.provider
            )));
        }

        let (mode, mode_cfg) = Self::mode_with_fallback(model, mode, endpoint)?;

        let file_format = mode_cfg
            .file_format
            .or(endpoint.file_format)
            .or(provider.file_format)
            .unwrap_or_default();
        let file_field = mode_cfg
            .file_field
            .clone()
            .or_else(|| endpoint.file_field.clone())
            .or_else(|| provider.file_field.clone())
            .unwrap_or_else(|| defaults::FILE_FIELD.to_string());
        let auth_type = endpoint
            .auth_type
            .or(provider.auth_type)
            .unwrap_or_default();
        let timeout_secs = endpoint
            .timeout_secs
            .unwrap_or(snapshot.settings().default_timeout);

        Ok(ResolvedConfig {
            provider: endpoint.provider.clone(),
            endpoint_name: endpoint.name().to_string(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: provider.api_key.clone(),
            api_format: endpoint.api_format,
            auth_type,
            prompt_prefix: endpoint.prompt_prefix.clone().unwrap_or_default(),
            model_name: endpoint.model_name.clone().unwrap_or_default(),
            mode,
            endpoint_path: mode_cfg.endpoint.clone(),
            content_kind: mode_cfg.content_type.unwrap_or_default(),
            response_path: mode_cfg
                .response_path
                .clone()
                .unwrap_or_else(|| defaults::RESPONSE_PATH.to_string()),
            response_kind: mode_cfg.response_kind.unwrap_or_default(),
            task_id_path: mode_cfg
                .task_id_path
                .clone()
                .unwrap_or_else(|| defaults::TASK_ID_PATH.to_string()),
            polling_endpoint: mode_cfg
                .polling_endpoint
                .clone()
                .unwrap_or_else(|| defaults::POLLING_ENDPOINT.to_string()),
            status_path: mode_cfg
                .status_path
                .clone()
                .unwrap_or_else(|| defaults::STATUS_PATH.to_string()),
            success_value: mode_cfg
                .success_value
                .clone()
                .unwrap_or_else(|| defaults::SUCCESS_VALUE.to_string()),
            file_format,
            file_field,
            payload_template: mode_cfg.payload_template.clone(),
            value_mappings: mode_cfg.value_mappings.clone(),
            generation_config: mode_cfg.generation_config.clone(),
            extra_params: endpoint.extra_params.clone(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Pick the requested mode, falling back to the endpoint's other mode
    /// when the requested one is absent.
    fn mode_with_fallback<'a>(
        model: &str,
        requested: OperationMode,
        endpoint: &'a EndpointConfig,
    ) -> Result<(OperationMode, &'a ModeConfig), Error> {
        if let Some(cfg) = endpoint.modes.get(&requested)
            && !cfg.endpoint.is_empty()
        {
            return Ok((requested, cfg));
        }
        let fallback = requested.fallback();
        if let Some(cfg) = endpoint.modes.get(&fallback)
            && !cfg.endpoint.is_empty()
        {
            tracing::debug!(
                model,
                requested = requested.as_str(),
                fallback = fallback.as_str(),
                "requested mode not configured, using fallback"
            );
            return Ok((fallback, cfg));
        }
        Err(Error::Config(format!(
            "model '{model}' endpoint '{}': no usable mode configuration",
            endpoint.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_fixtures;

    fn resolve_first(mode: OperationMode) -> ResolvedConfig {
        let snapshot = test_fixtures::snapshot();
        let eps = snapshot.endpoints_for("sketchwave").unwrap();
        ConfigResolver::resolve(&snapshot, "sketchwave", mode, eps[0]).unwrap()
    }

    #[test]
    fn provider_default_survives_to_resolved_config() {
        // file_format comes from the provider level (acme: numbered).
        let resolved = resolve_first(OperationMode::AssetToAsset);
        assert_eq!(resolved.file_format, FileFormat::Numbered);
        assert_eq!(resolved.file_field, "image");
    }

    #[test]
    fn optional_fields_get_concrete_defaults() {
        let resolved = resolve_first(OperationMode::AssetToAsset);
        assert_eq!(resolved.response_kind, ResponseKind::Sync);
        assert_eq!(resolved.task_id_path, "task_id");
        assert_eq!(resolved.success_value, "SUCCESS");
        assert_eq!(resolved.prompt_prefix, "");
        assert_eq!(resolved.timeout, Duration::from_secs(600));
    }

    #[test]
    fn mode_level_content_type_wins() {
        let t2a = resolve_first(OperationMode::TextToAsset);
        assert_eq!(t2a.content_kind, ContentKind::Json);
        let a2a = resolve_first(OperationMode::AssetToAsset);
        assert_eq!(a2a.content_kind, ContentKind::Multipart);
    }

    #[test]
    fn missing_mode_falls_back_to_sibling() {
        // The lumina endpoint only configures text_to_asset.
        let snapshot = test_fixtures::snapshot();
        let eps = snapshot.endpoints_for("sketchwave").unwrap();
        let resolved = ConfigResolver::resolve(
            &snapshot,
            "sketchwave",
            OperationMode::AssetToAsset,
            eps[1],
        )
        .unwrap();
        assert_eq!(resolved.mode, OperationMode::TextToAsset);
        assert_eq!(resolved.api_format, ApiFormat::Gemini);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let snapshot = test_fixtures::snapshot();
        let eps = snapshot.endpoints_for("sketchwave").unwrap();
        let resolved = ConfigResolver::resolve(
            &snapshot,
            "sketchwave",
            OperationMode::TextToAsset,
            eps[1],
        )
        .unwrap();
        assert_eq!(resolved.base_url, "https://lumina.test");
        assert_eq!(
            resolved.request_url("lumina-flash"),
            "https://lumina.test/v1beta/models/lumina-flash:generateContent"
        );
    }

    #[test]
    fn dangling_provider_is_a_config_error() {
        let snapshot = test_fixtures::snapshot();
        let mut ep = snapshot.endpoints_for("sketchwave").unwrap()[0].clone();
        ep.provider = "ghost".to_string();
        let err = ConfigResolver::resolve(&snapshot, "sketchwave", OperationMode::TextToAsset, &ep)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
