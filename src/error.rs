//! Error Handling Module
//!
//! Error taxonomy for the generation pipeline:
//! - `Config` / `Build`: fatal before any network work
//! - `Transport` / `Timeout` / retryable `Api`: absorbed by the retry loop
//! - `UpstreamRejected`: the provider understood the request and refused it;
//!   never retried
//! - `ExhaustedEndpoints`: every candidate endpoint failed for one task

use std::time::Duration;

/// Unified error type for batchbox operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A required configuration field is unresolvable at every override level.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed task input (e.g. asset data that cannot be decoded).
    #[error("Invalid task input: {0}")]
    Build(String),

    /// Connection-level failure (DNS, connect, broken body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request did not complete within the resolved timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream HTTP error with status code.
    #[error("API error {code}: {message}")]
    Api {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Well-formed error payload from the provider (quota, refusal, bad
    /// parameters). Fatal for the whole logical call; siblings keep running.
    #[error("Upstream rejected request: {0}")]
    UpstreamRejected(String),

    /// Every candidate endpoint for the model failed.
    #[error("All endpoints exhausted for model '{model}' after {attempts} attempt(s)")]
    ExhaustedEndpoints { model: String, attempts: u32 },

    /// Response body could not be interpreted; retryable against the next
    /// endpoint since proxies routinely mangle bodies.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The batch was aborted before this task was admitted.
    #[error("Generation cancelled before dispatch")]
    Cancelled,

    /// Invariant violation inside the library.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Construct an API error without structured details.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Whether the retry loop may advance to another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Parse(_) => true,
            Self::Api { code, .. } => *code == 429 || (500..=599).contains(code),
            _ => false,
        }
    }
}

/// Classify an HTTP failure status into the taxonomy above.
///
/// Provider-agnostic heuristics: quota/rate envelopes are detected from the
/// body text so 403/400 responses that are really "out of credits" surface as
/// `UpstreamRejected` instead of a generic client error.
pub fn classify_http_status(provider: &str, status: u16, body_text: &str) -> Error {
    let lower = body_text.to_lowercase();
    // Limit body sample size to avoid noisy logs
    let body_sample: String = body_text.chars().take(200).collect();

    if status == 429 {
        return Error::api_error(
            status,
            format!("provider={provider} rate limited body_sample={body_sample}"),
        );
    }

    if (500..=599).contains(&status) {
        return Error::api_error(
            status,
            format!("provider={provider} server error body_sample={body_sample}"),
        );
    }

    if status == 403 || status == 400 {
        let quota_like = lower.contains("quota") || lower.contains("exceed");
        if quota_like {
            return Error::UpstreamRejected(format!("provider={provider} quota exceeded"));
        }
    }

    match status {
        401 | 403 => Error::UpstreamRejected(format!(
            "provider={provider} unauthorized (HTTP {status}) body_sample={body_sample}"
        )),
        404 => Error::UpstreamRejected(format!(
            "provider={provider} endpoint not found body_sample={body_sample}"
        )),
        413 => Error::UpstreamRejected(format!("provider={provider} payload too large")),
        415 => Error::UpstreamRejected(format!("provider={provider} unsupported media type")),
        _ => Error::UpstreamRejected(format!(
            "provider={provider} HTTP {status} body_sample={body_sample}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::Transport("reset".into()).is_retryable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(Error::api_error(503, "unavailable").is_retryable());
        assert!(Error::api_error(429, "slow down").is_retryable());
        assert!(!Error::api_error(418, "teapot").is_retryable());
        assert!(!Error::UpstreamRejected("quota".into()).is_retryable());
        assert!(!Error::Config("missing base_url".into()).is_retryable());
    }

    #[test]
    fn quota_body_maps_to_upstream_rejected() {
        let err = classify_http_status("acme", 403, r#"{"error":"monthly quota exceeded"}"#);
        assert!(matches!(err, Error::UpstreamRejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_stay_retryable() {
        let err = classify_http_status("acme", 502, "<html>bad gateway</html>");
        match err {
            Error::Api { code, .. } => assert_eq!(code, 502),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
