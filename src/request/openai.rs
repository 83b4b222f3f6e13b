//! OpenAI-style request building
//!
//! Covers the broad family of OpenAI-compatible media APIs: JSON bodies for
//! prompt-only calls, multipart form bodies when input assets are uploaded.
//! Payloads come from an optional config template, then common parameters are
//! auto-filled, then endpoint `extra_params` are merged without overriding.

use super::template::TemplateEngine;
use super::{AuthContext, BuiltRequest, MultipartFile, RequestBody, RESERVED_PREFIX};
use crate::config::ResolvedConfig;
use crate::error::Error;
use crate::types::{ContentKind, GenerationTask};

/// Parameters auto-copied into the payload when no template claims them.
const AUTO_PARAMS: &[&str] = &[
    "prompt",
    "n",
    "size",
    "quality",
    "style",
    "resolution",
    "aspect_ratio",
    "seed",
    "response_format",
    "upscale",
    "image_size",
];

pub(super) fn build(
    resolved: &ResolvedConfig,
    task: &GenerationTask,
    auth: &AuthContext,
) -> Result<BuiltRequest, Error> {
    let params = super::effective_params(resolved, task);
    let model = auth.effective_model(resolved);

    let mut payload = match &resolved.payload_template {
        Some(template) => {
            let engine = TemplateEngine::new(&resolved.value_mappings, &task.assets);
            match engine.render(template, &params) {
                serde_json::Value::Object(map) => map,
                other => {
                    return Err(Error::Build(format!(
                        "payload template must render to an object, got {other}"
                    )));
                }
            }
        }
        None => serde_json::Map::new(),
    };

    if !model.is_empty() && !payload.contains_key("model") {
        payload.insert("model".to_string(), serde_json::json!(model));
    }

    for name in AUTO_PARAMS {
        if payload.contains_key(*name) {
            continue;
        }
        if let Some(value) = params.get(*name) {
            // Empty strings and nulls are "unset", not values to transmit.
            if value.is_null() || value.as_str().is_some_and(|s| s.is_empty()) {
                continue;
            }
            payload.insert((*name).to_string(), value.clone());
        }
    }

    for (key, value) in &resolved.extra_params {
        payload.entry(key.clone()).or_insert_with(|| value.clone());
    }

    let mut url = resolved.request_url(model);
    let mut headers = Vec::new();
    auth.apply(&mut url, &mut headers);

    let body = match resolved.content_kind {
        ContentKind::Json => RequestBody::Json(serde_json::Value::Object(payload)),
        ContentKind::Multipart => multipart_body(resolved, task, payload),
    };

    Ok(BuiltRequest {
        url,
        headers,
        body,
        timeout: resolved.timeout,
    })
}

/// Split the payload into text form fields and named file parts.
///
/// Every payload key is kept as a form field unless it is an internal key
/// (reserved `_` prefix) or it *is* the file-upload field itself. In
/// particular a key like `image_size` survives even when the upload field is
/// named `image`; prefix overlap alone never drops a parameter.
fn multipart_body(
    resolved: &ResolvedConfig,
    task: &GenerationTask,
    payload: serde_json::Map<String, serde_json::Value>,
) -> RequestBody {
    let fields = payload
        .into_iter()
        .filter(|(key, _)| !key.starts_with(RESERVED_PREFIX) && key != &resolved.file_field)
        .map(|(key, value)| (key, form_value(value)))
        .collect();

    let files = task
        .assets
        .iter()
        .enumerate()
        .map(|(i, asset)| MultipartFile {
            field: resolved.file_format.field_name(&resolved.file_field, i),
            filename: asset.filename.clone(),
            bytes: asset.bytes.clone(),
            mime: asset.mime.clone(),
        })
        .collect();

    RequestBody::Multipart { fields, files }
}

fn form_value(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigResolver, test_fixtures};
    use crate::types::{Asset, OperationMode};
    use secrecy::SecretString;
    use std::sync::Arc;

    fn task(mode: OperationMode, assets: Vec<Asset>) -> GenerationTask {
        GenerationTask {
            model: "sketchwave".to_string(),
            mode,
            prompt: "a lighthouse at dusk".to_string(),
            seed: 7,
            batch_index: 0,
            params: serde_json::Map::new(),
            assets: Arc::new(assets),
        }
    }

    fn resolved(mode: OperationMode) -> crate::config::ResolvedConfig {
        let snapshot = test_fixtures::snapshot();
        let eps = snapshot.endpoints_for("sketchwave").unwrap();
        ConfigResolver::resolve(&snapshot, "sketchwave", mode, eps[0]).unwrap()
    }

    fn bearer() -> AuthContext {
        AuthContext::bearer(SecretString::from("sk-test".to_string()))
    }

    #[test]
    fn json_body_includes_model_prompt_and_seed() {
        let req = build(&resolved(OperationMode::TextToAsset), &task(OperationMode::TextToAsset, vec![]), &bearer())
            .unwrap();
        assert_eq!(req.url, "https://api.acme.test/v1/images/generations");
        let RequestBody::Json(body) = req.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["model"], "sketchwave-v1");
        assert_eq!(body["prompt"], "a lighthouse at dusk");
        assert_eq!(body["seed"], 7);
        assert!(
            req.headers
                .iter()
                .any(|(k, v)| k == "Authorization" && v == "Bearer sk-test")
        );
    }

    #[test]
    fn multipart_keeps_image_prefixed_params() {
        // Regression: `image_size` must survive even though the upload field
        // is named `image`.
        let mut t = task(
            OperationMode::AssetToAsset,
            vec![Asset::from_bytes("in.png", b"x".to_vec(), Some("image/png".into()))],
        );
        t.params
            .insert("image_size".to_string(), serde_json::json!("2K"));
        t.params
            .insert("_internal".to_string(), serde_json::json!("drop me"));

        let req = build(&resolved(OperationMode::AssetToAsset), &t, &bearer()).unwrap();
        let RequestBody::Multipart { fields, files } = req.body else {
            panic!("expected multipart body");
        };
        assert!(fields.iter().any(|(k, v)| k == "image_size" && v == "2K"));
        assert!(!fields.iter().any(|(k, _)| k == "_internal"));
        assert!(!fields.iter().any(|(k, _)| k == "image"));
        // Provider-level file_format is `numbered` in the fixture.
        assert_eq!(files[0].field, "image1");
    }

    #[test]
    fn extra_params_never_override_payload() {
        let mut t = task(OperationMode::TextToAsset, vec![]);
        t.params.insert("n".to_string(), serde_json::json!(2));
        let mut cfg = resolved(OperationMode::TextToAsset);
        cfg.extra_params
            .insert("n".to_string(), serde_json::json!(9));
        cfg.extra_params
            .insert("watermark".to_string(), serde_json::json!(false));

        let req = build(&cfg, &t, &bearer()).unwrap();
        let RequestBody::Json(body) = req.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["n"], 2);
        assert_eq!(body["watermark"], false);
    }

    #[test]
    fn template_payload_takes_precedence_over_auto_params() {
        let mut cfg = resolved(OperationMode::TextToAsset);
        cfg.payload_template = Some(serde_json::json!({
            "input": {"text": "{{prompt}}"},
            "size": "fixed"
        }));
        let mut t = task(OperationMode::TextToAsset, vec![]);
        t.params
            .insert("size".to_string(), serde_json::json!("1024x1024"));

        let req = build(&cfg, &t, &bearer()).unwrap();
        let RequestBody::Json(body) = req.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["size"], "fixed");
        assert_eq!(body["input"]["text"], "a lighthouse at dusk");
    }
}
