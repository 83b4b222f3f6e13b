//! Response parsing
//!
//! Extracts generated artifacts from protocol-specific response bodies. The
//! format is detected from the response shape when it disagrees with the
//! declared one (a `candidates` array means gemini, whatever the config
//! says). Malformed bodies are retryable `Parse` errors; well-formed error
//! payloads are `UpstreamRejected` and end the call.

mod gemini;
mod openai;

use crate::config::ResolvedConfig;
use crate::error::Error;
use crate::types::{ApiFormat, Artifact, ResponseKind};

/// Outcome of parsing one 2xx response body.
#[derive(Debug)]
pub enum ParsedResponse {
    /// Artifacts extracted inline.
    Artifacts(Vec<Artifact>),
    /// The endpoint accepted the job and handed back a task id to poll.
    PendingTask { task_id: String },
}

/// Parse a successful (2xx) response body.
pub fn parse(resolved: &ResolvedConfig, body_text: &str) -> Result<ParsedResponse, Error> {
    let data: serde_json::Value = serde_json::from_str(body_text).map_err(|_| {
        let sample: String = body_text.chars().take(200).collect();
        Error::Parse(format!("invalid JSON response: {sample}"))
    })?;

    if let Some(message) = upstream_error_message(&data) {
        return Err(Error::UpstreamRejected(message));
    }

    // Shape wins over declared format.
    if resolved.api_format == ApiFormat::Gemini || data.get("candidates").is_some() {
        return gemini::parse(&data).map(ParsedResponse::Artifacts);
    }

    if resolved.response_kind == ResponseKind::Async {
        if let Some(task_id) = nested_value(&data, &resolved.task_id_path)
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        {
            return Ok(ParsedResponse::PendingTask { task_id });
        }
        // Fall through: some "async" endpoints answer inline on fast paths.
    }

    openai::parse(&data, &resolved.response_path).map(ParsedResponse::Artifacts)
}

/// Extract artifacts from a polling payload once the task reports success.
pub fn parse_polled(resolved: &ResolvedConfig, data: &serde_json::Value) -> Result<Vec<Artifact>, Error> {
    if data.get("candidates").is_some() {
        return gemini::parse(data);
    }
    openai::parse(data, &resolved.response_path)
}

/// A well-formed error envelope in an otherwise-2xx body.
fn upstream_error_message(data: &serde_json::Value) -> Option<String> {
    match data.get("error") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Object(obj)) => Some(
            obj.get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
                .unwrap_or_else(|| serde_json::Value::Object(obj.clone()).to_string()),
        ),
        _ => None,
    }
}

/// Navigate a dot-separated path (`data.status`, `output.0.id`). Numeric
/// segments index into arrays.
pub fn nested_value<'a>(
    data: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut current = data;
    for key in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(key)?,
            serde_json::Value::Array(items) => {
                let idx: usize = key.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}
