//! Gemini-style request building
//!
//! generateContent payloads: a `contents` array carrying the prompt text and
//! inline base64 asset parts, plus a `generationConfig` assembled from the
//! resolved config and per-task parameters. Gemini only accepts specific
//! aspect-ratio strings, so the `"auto"` sentinel (and the non-native
//! size buckets) are omitted rather than sent literally.

use super::{AuthContext, BuiltRequest, RequestBody};
use crate::config::ResolvedConfig;
use crate::error::Error;
use crate::types::GenerationTask;

pub(super) fn build(
    resolved: &ResolvedConfig,
    task: &GenerationTask,
    auth: &AuthContext,
) -> Result<BuiltRequest, Error> {
    let params = super::effective_params(resolved, task);
    let model = auth.effective_model(resolved);

    let prompt = params
        .get("prompt")
        .and_then(|p| p.as_str())
        .unwrap_or_default();
    let mut parts = vec![serde_json::json!({"text": prompt})];
    for asset in task.assets.iter() {
        parts.push(serde_json::json!({
            "inline_data": {
                "mime_type": asset.mime,
                "data": asset.base64(),
            }
        }));
    }

    let mut generation_config = resolved.generation_config.clone();

    // responseModalities may arrive through endpoint extra_params.
    if let Some(modalities) = resolved.extra_params.get("responseModalities")
        && !generation_config.contains_key("responseModalities")
    {
        generation_config.insert("responseModalities".to_string(), modalities.clone());
    }

    if task.seed > 0 && !generation_config.contains_key("seed") {
        generation_config.insert("seed".to_string(), serde_json::json!(task.seed));
    }

    let image_config = image_config(&params);
    if !image_config.is_empty() {
        generation_config.insert(
            "imageConfig".to_string(),
            serde_json::Value::Object(image_config),
        );
    }

    generation_config
        .entry("maxOutputTokens".to_string())
        .or_insert_with(|| serde_json::json!(4096));

    let payload = serde_json::json!({
        "contents": [{"parts": parts}],
        "generationConfig": generation_config,
    });

    let mut url = resolved.request_url(model);
    let mut headers = Vec::new();
    auth.apply(&mut url, &mut headers);

    Ok(BuiltRequest {
        url,
        headers,
        body: RequestBody::Json(payload),
        timeout: resolved.timeout,
    })
}

/// Nested image settings. Values the API would reject are skipped entirely:
/// `aspectRatio` must be a concrete ratio (never `"auto"`), and `imageSize`
/// only accepts native size names.
fn image_config(
    params: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut config = serde_json::Map::new();

    if let Some(size) = params.get("image_size").and_then(|v| v.as_str())
        && !size.is_empty()
        && !matches!(size.to_lowercase().as_str(), "auto" | "1k" | "2k" | "4k")
    {
        config.insert("imageSize".to_string(), serde_json::json!(size));
    }

    if let Some(ratio) = params.get("aspect_ratio").and_then(|v| v.as_str())
        && !ratio.is_empty()
        && ratio.to_lowercase() != "auto"
    {
        config.insert("aspectRatio".to_string(), serde_json::json!(ratio));
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigResolver, test_fixtures};
    use crate::types::{Asset, OperationMode};
    use secrecy::SecretString;
    use std::sync::Arc;

    fn gemini_resolved() -> ResolvedConfig {
        let snapshot = test_fixtures::snapshot();
        let eps = snapshot.endpoints_for("sketchwave").unwrap();
        ConfigResolver::resolve(&snapshot, "sketchwave", OperationMode::TextToAsset, eps[1])
            .unwrap()
    }

    fn task_with_params(
        pairs: &[(&str, serde_json::Value)],
        assets: Vec<Asset>,
    ) -> GenerationTask {
        GenerationTask {
            model: "sketchwave".to_string(),
            mode: OperationMode::TextToAsset,
            prompt: "an origami fox".to_string(),
            seed: 11,
            batch_index: 0,
            params: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            assets: Arc::new(assets),
        }
    }

    fn query_auth() -> AuthContext {
        AuthContext {
            material: super::super::AuthMaterial::Query(SecretString::from("lm-123".to_string())),
            model_override: None,
        }
    }

    fn body_of(req: BuiltRequest) -> serde_json::Value {
        match req.body {
            RequestBody::Json(v) => v,
            _ => panic!("expected JSON body"),
        }
    }

    #[test]
    fn builds_contents_with_prompt_prefix_and_inline_assets() {
        let asset = Asset::from_bytes("ref.png", b"imgdata".to_vec(), Some("image/png".into()));
        let req = build(
            &gemini_resolved(),
            &task_with_params(&[], vec![asset]),
            &query_auth(),
        )
        .unwrap();
        assert_eq!(
            req.url,
            "https://lumina.test/v1beta/models/lumina-flash:generateContent?key=lm-123"
        );
        let body = body_of(req);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "Generate an image: an origami fox");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    }

    #[test]
    fn generation_config_carries_seed_modalities_and_token_cap() {
        let req = build(&gemini_resolved(), &task_with_params(&[], vec![]), &query_auth()).unwrap();
        let body = body_of(req);
        let config = &body["generationConfig"];
        assert_eq!(config["seed"], 11);
        assert_eq!(config["maxOutputTokens"], 4096);
        assert_eq!(config["responseModalities"], serde_json::json!(["IMAGE"]));
    }

    #[test]
    fn auto_aspect_ratio_is_omitted_entirely() {
        let req = build(
            &gemini_resolved(),
            &task_with_params(
                &[
                    ("aspect_ratio", serde_json::json!("auto")),
                    ("image_size", serde_json::json!("2K")),
                ],
                vec![],
            ),
            &query_auth(),
        )
        .unwrap();
        let body = body_of(req);
        let rendered = body.to_string();
        assert!(!rendered.contains("aspectRatio"));
        assert!(!rendered.contains("imageSize"));
    }

    #[test]
    fn concrete_aspect_ratio_is_sent() {
        let req = build(
            &gemini_resolved(),
            &task_with_params(&[("aspect_ratio", serde_json::json!("16:9"))], vec![]),
            &query_auth(),
        )
        .unwrap();
        let body = body_of(req);
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
    }
}
