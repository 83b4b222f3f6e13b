//! Gemini-style response parsing
//!
//! Artifacts live in `candidates[0].content.parts[]`, either as inline base64
//! (`inlineData`) or a file reference (`fileData.fileUri`). Both camelCase
//! and snake_case spellings occur in the wild, so both are accepted. A part
//! carrying neither is skipped, not fatal.

use base64::Engine;

use crate::error::Error;
use crate::types::Artifact;

pub(super) fn parse(data: &serde_json::Value) -> Result<Vec<Artifact>, Error> {
    let candidates = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Parse("no candidates in gemini response".to_string()))?;

    let candidate = &candidates[0];

    // The model understood the request but declined to produce media.
    if let Some(reason) = candidate.get("finishReason").and_then(|r| r.as_str())
        && matches!(reason, "OTHER" | "SAFETY" | "PROHIBITED_CONTENT")
    {
        return Err(Error::UpstreamRejected(format!(
            "gemini declined to generate (finishReason={reason})"
        )));
    }

    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();

    let mut artifacts = Vec::new();
    for part in &parts {
        if let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) {
            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string());
            if let Some(b64) = inline.get("data").and_then(|d| d.as_str())
                && !b64.is_empty()
            {
                match base64::engine::general_purpose::STANDARD.decode(b64) {
                    Ok(bytes) => artifacts.push(Artifact::inline(bytes, mime)),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping undecodable inline part");
                    }
                }
            }
            continue;
        }

        if let Some(file) = part.get("fileData").or_else(|| part.get("file_data")) {
            if let Some(uri) = file
                .get("fileUri")
                .or_else(|| file.get("file_uri"))
                .and_then(|u| u.as_str())
            {
                artifacts.push(Artifact::url(uri));
            }
        }
        // Text-only parts are commentary, not artifacts.
    }

    if artifacts.is_empty() {
        return Err(Error::Parse("no artifacts in gemini response".to_string()));
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_and_file_parts_both_extracted() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"pixels");
        let data = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "here is your image"},
                    {"inlineData": {"mimeType": "image/png", "data": payload}},
                    {"file_data": {"file_uri": "https://files.test/x.png"}},
                ]},
                "finishReason": "STOP"
            }]
        });
        let artifacts = parse(&data).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].as_bytes(), Some(b"pixels".as_slice()));
        assert_eq!(artifacts[0].mime.as_deref(), Some("image/png"));
        assert_eq!(artifacts[1].as_url(), Some("https://files.test/x.png"));
    }

    #[test]
    fn snake_case_inline_data_accepted() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"px");
        let data = serde_json::json!({
            "candidates": [{"content": {"parts": [
                {"inline_data": {"mime_type": "image/webp", "data": payload}}
            ]}}]
        });
        let artifacts = parse(&data).unwrap();
        assert_eq!(artifacts[0].mime.as_deref(), Some("image/webp"));
    }

    #[test]
    fn refusal_finish_reason_is_upstream_rejected() {
        let data = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "cannot do that"}]},
                            "finishReason": "OTHER"}]
        });
        assert!(matches!(
            parse(&data),
            Err(Error::UpstreamRejected(_))
        ));
    }

    #[test]
    fn missing_candidates_is_retryable_parse_error() {
        let err = parse(&serde_json::json!({"candidates": []})).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn partless_candidate_yields_parse_error_not_panic() {
        let data = serde_json::json!({"candidates": [{"finishReason": "STOP"}]});
        assert!(matches!(parse(&data), Err(Error::Parse(_))));
    }
}
