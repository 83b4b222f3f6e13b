//! Payload template engine
//!
//! Renders config-declared payload templates against a parameter map.
//! Supports `{{variable}}` substitution, value-mapping tables for variables
//! with a `_map_` prefix, and the `_chat_content` special variable that
//! expands into a chat-style content array (text part + data-URL image
//! parts).

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::Asset;

lazy_static! {
    static ref VARIABLE_RE: Regex = Regex::new(r"\{\{(\w+)\}\}").expect("static pattern");
    static ref FULL_VARIABLE_RE: Regex = Regex::new(r"^\{\{(\w+)\}\}$").expect("static pattern");
}

pub struct TemplateEngine<'a> {
    value_mappings: &'a HashMap<String, HashMap<String, serde_json::Value>>,
    assets: &'a [Asset],
}

impl<'a> TemplateEngine<'a> {
    pub fn new(
        value_mappings: &'a HashMap<String, HashMap<String, serde_json::Value>>,
        assets: &'a [Asset],
    ) -> Self {
        Self {
            value_mappings,
            assets,
        }
    }

    /// Render a template value. Object entries that render to null are
    /// dropped so optional parameters disappear instead of being sent as
    /// literal nulls.
    pub fn render(
        &self,
        template: &serde_json::Value,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Value {
        match template {
            serde_json::Value::String(s) => self.render_string(s, params),
            serde_json::Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    let rendered = self.render(value, params);
                    if !rendered.is_null() {
                        out.insert(key.clone(), rendered);
                    }
                }
                serde_json::Value::Object(out)
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(
                items.iter().map(|item| self.render(item, params)).collect(),
            ),
            other => other.clone(),
        }
    }

    fn render_string(
        &self,
        template: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Value {
        // A string that is exactly one variable keeps the value's JSON type.
        if let Some(caps) = FULL_VARIABLE_RE.captures(template) {
            return self.variable_value(&caps[1], params);
        }

        let substituted = VARIABLE_RE.replace_all(template, |caps: &regex::Captures<'_>| {
            match self.variable_value(&caps[1], params) {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }
        });
        serde_json::Value::String(substituted.into_owned())
    }

    fn variable_value(
        &self,
        name: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Value {
        if name == "_chat_content" {
            return self.chat_content(params);
        }
        if name.starts_with('_') {
            return self.mapped_value(name, params);
        }
        params.get(name).cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Chat-API content array: one text part plus a data-URL image part per
    /// input asset.
    fn chat_content(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Value {
        let mut content = Vec::new();
        if let Some(prompt) = params.get("prompt").and_then(|p| p.as_str())
            && !prompt.is_empty()
        {
            content.push(serde_json::json!({"type": "text", "text": prompt}));
        }
        for asset in self.assets {
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": {"url": asset.data_url()}
            }));
        }
        serde_json::Value::Array(content)
    }

    /// Resolve `_map_<param>` through the configured value-mapping table.
    /// Unmapped source values pass through unchanged.
    fn mapped_value(
        &self,
        name: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Value {
        let Some(mapping) = self.value_mappings.get(name) else {
            return serde_json::Value::Null;
        };

        let source = name
            .strip_prefix("_map_")
            .and_then(|param| params.get(param))
            .or_else(|| {
                // No direct parameter: fall back to any param whose value
                // appears in the mapping table.
                params.values().find(|v| {
                    v.as_str().is_some_and(|s| mapping.contains_key(s))
                })
            });

        match source.and_then(|v| v.as_str()) {
            Some(key) => mapping
                .get(key)
                .cloned()
                .unwrap_or_else(|| serde_json::Value::String(key.to_string())),
            None => serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn full_variable_keeps_json_type() {
        let mappings = HashMap::new();
        let engine = TemplateEngine::new(&mappings, &[]);
        let template = serde_json::json!({"n": "{{count}}", "prompt": "{{prompt}}"});
        let rendered = engine.render(
            &template,
            &params(&[
                ("count", serde_json::json!(4)),
                ("prompt", serde_json::json!("a cat")),
            ]),
        );
        assert_eq!(rendered, serde_json::json!({"n": 4, "prompt": "a cat"}));
    }

    #[test]
    fn missing_variables_drop_object_entries() {
        let mappings = HashMap::new();
        let engine = TemplateEngine::new(&mappings, &[]);
        let template = serde_json::json!({"style": "{{style}}", "prompt": "p: {{prompt}}"});
        let rendered = engine.render(&template, &params(&[("prompt", serde_json::json!("x"))]));
        assert_eq!(rendered, serde_json::json!({"prompt": "p: x"}));
    }

    #[test]
    fn value_mapping_translates_and_passes_through() {
        let mut mappings = HashMap::new();
        mappings.insert(
            "_map_size".to_string(),
            HashMap::from([
                ("1K".to_string(), serde_json::json!("1024x1024")),
                ("2K".to_string(), serde_json::json!("1792x1024")),
            ]),
        );
        let engine = TemplateEngine::new(&mappings, &[]);
        let template = serde_json::json!({"size": "{{_map_size}}"});

        let mapped = engine.render(&template, &params(&[("size", serde_json::json!("2K"))]));
        assert_eq!(mapped, serde_json::json!({"size": "1792x1024"}));

        let passthrough =
            engine.render(&template, &params(&[("size", serde_json::json!("768x768"))]));
        assert_eq!(passthrough, serde_json::json!({"size": "768x768"}));
    }

    #[test]
    fn chat_content_includes_prompt_and_assets() {
        let mappings = HashMap::new();
        let assets = vec![Asset::from_bytes(
            "a.png",
            b"fake".to_vec(),
            Some("image/png".to_string()),
        )];
        let engine = TemplateEngine::new(&mappings, &assets);
        let template = serde_json::json!({"messages": [{"role": "user", "content": "{{_chat_content}}"}]});
        let rendered = engine.render(&template, &params(&[("prompt", serde_json::json!("hi"))]));
        let content = &rendered["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert!(
            content[1]["image_url"]["url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );
    }
}
