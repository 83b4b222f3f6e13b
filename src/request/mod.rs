//! Request building
//!
//! Converts a resolved configuration plus one generation task into a
//! protocol-specific HTTP request. Building is a pure transform: no I/O, and
//! `Error::Build` only for malformed task input. Auth material is resolved by
//! the executor beforehand so builders stay synchronous.

mod gemini;
mod openai;
pub(crate) mod template;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::ResolvedConfig;
use crate::error::Error;
use crate::types::{ApiFormat, GenerationTask};

/// Parameter keys with this prefix are internal/control values and never
/// reach the wire.
pub const RESERVED_PREFIX: char = '_';

/// One file part of a multipart body.
#[derive(Clone)]
pub struct MultipartFile {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Body of a built request.
pub enum RequestBody {
    Json(serde_json::Value),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<MultipartFile>,
    },
}

/// A fully-assembled HTTP request, ready for the transport.
pub struct BuiltRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl std::fmt::Debug for BuiltRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            RequestBody::Json(_) => "json",
            RequestBody::Multipart { files, .. } => {
                return f
                    .debug_struct("BuiltRequest")
                    .field("url", &self.url)
                    .field("body", &format!("multipart({} files)", files.len()))
                    .finish();
            }
        };
        // Headers carry credentials; log the URL only.
        f.debug_struct("BuiltRequest")
            .field("url", &self.url)
            .field("body", &body)
            .finish()
    }
}

/// Credential material resolved by the executor for one attempt.
pub enum AuthMaterial {
    /// `Authorization: Bearer <key>`.
    Bearer(SecretString),
    /// Key appended to the URL query; no auth header.
    Query(SecretString),
    /// Session token in the `X-Auth-T` header.
    Session(SecretString),
}

pub struct AuthContext {
    pub material: AuthMaterial,
    /// Account-resolved upstream model id, overriding the endpoint's
    /// `model_name` when present.
    pub model_override: Option<String>,
}

impl AuthContext {
    pub fn bearer(key: SecretString) -> Self {
        Self {
            material: AuthMaterial::Bearer(key),
            model_override: None,
        }
    }

    /// Upstream model identifier for this attempt.
    pub(crate) fn effective_model<'a>(&'a self, resolved: &'a ResolvedConfig) -> &'a str {
        self.model_override.as_deref().unwrap_or(&resolved.model_name)
    }

    /// Apply credentials to an outgoing request.
    pub(crate) fn apply(&self, url: &mut String, headers: &mut Vec<(String, String)>) {
        match &self.material {
            AuthMaterial::Bearer(key) => {
                headers.push((
                    "Authorization".to_string(),
                    format!("Bearer {}", key.expose_secret()),
                ));
            }
            AuthMaterial::Query(key) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                url.push(sep);
                url.push_str("key=");
                url.push_str(&urlencoding::encode(key.expose_secret()));
            }
            AuthMaterial::Session(token) => {
                headers.push(("X-Auth-T".to_string(), token.expose_secret().to_string()));
            }
        }
    }
}

/// Build the HTTP request for one task against one resolved endpoint.
pub fn build(
    resolved: &ResolvedConfig,
    task: &GenerationTask,
    auth: &AuthContext,
) -> Result<BuiltRequest, Error> {
    match resolved.api_format {
        ApiFormat::OpenAi => openai::build(resolved, task, auth),
        ApiFormat::Gemini => gemini::build(resolved, task, auth),
    }
}

/// Merge the task's dynamic parameters with prompt and seed into one map.
/// The endpoint's prompt prefix is applied here so every builder sees the
/// final prompt text.
fn effective_params(
    resolved: &ResolvedConfig,
    task: &GenerationTask,
) -> serde_json::Map<String, serde_json::Value> {
    let mut params = task.params.clone();
    let prompt = if resolved.prompt_prefix.is_empty() {
        task.prompt.clone()
    } else {
        format!("{}{}", resolved.prompt_prefix, task.prompt)
    };
    params.insert("prompt".to_string(), serde_json::Value::String(prompt));
    if task.seed > 0 {
        params.insert("seed".to_string(), serde_json::json!(task.seed));
    }
    params
}
