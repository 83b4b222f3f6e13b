//! OpenAI-style response parsing
//!
//! Artifact locations vary wildly across compatible vendors, so extraction is
//! driven by a configured response path (`data[*].url`, `data.data[0].b64_json`,
//! ...) with `[*]` fanning out over arrays. Terminal values are interpreted
//! liberally: direct URLs, markdown image links embedded in text, base64
//! blobs, or `{url}` / `{b64_json}` objects.

use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;
use crate::types::Artifact;

lazy_static! {
    static ref MD_IMAGE_RE: Regex =
        Regex::new(r#"!\[[^\]]*\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#).expect("static pattern");
}

/// Heuristic floor: strings shorter than this are never treated as base64
/// payloads.
const MIN_BASE64_LEN: usize = 100;

pub(super) fn parse(data: &serde_json::Value, response_path: &str) -> Result<Vec<Artifact>, Error> {
    let mut artifacts = Vec::new();
    collect(data, &parse_path(response_path), &mut artifacts);
    if artifacts.is_empty() {
        return Err(Error::Parse(format!(
            "no artifacts found at response path '{response_path}'"
        )));
    }
    Ok(artifacts)
}

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for piece in path.split('.') {
        let mut rest = piece;
        // A piece looks like `data`, `data[0]`, or `data[*]`.
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(close) = rest.find(']') {
                let inner = &rest[1..close];
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else if let Ok(idx) = inner.parse::<usize>() {
                    segments.push(Segment::Index(idx));
                }
                rest = &rest[close + 1..];
                if !rest.starts_with('[') {
                    break;
                }
            }
        } else if !rest.is_empty() {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    segments
}

fn collect(value: &serde_json::Value, segments: &[Segment], out: &mut Vec<Artifact>) {
    let Some((head, tail)) = segments.split_first() else {
        push_value(value, out);
        return;
    };

    match head {
        Segment::Key(key) => {
            if let Some(next) = value.get(key) {
                collect(next, tail, out);
            }
        }
        Segment::Index(idx) => {
            if let Some(next) = value.as_array().and_then(|items| items.get(*idx)) {
                collect(next, tail, out);
            }
        }
        Segment::Wildcard => {
            if let Some(items) = value.as_array() {
                for item in items {
                    collect(item, tail, out);
                }
            }
        }
    }
}

/// Interpret a terminal value as zero or more artifacts.
fn push_value(value: &serde_json::Value, out: &mut Vec<Artifact>) {
    match value {
        serde_json::Value::String(s) => push_string(s, out),
        serde_json::Value::Object(obj) => {
            if let Some(url) = obj.get("url").and_then(|u| u.as_str()) {
                out.push(Artifact::url(url));
            } else if let Some(b64) = obj.get("b64_json").and_then(|b| b.as_str()) {
                if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(b64) {
                    out.push(Artifact::inline(bytes, None));
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                push_value(item, out);
            }
        }
        _ => {}
    }
}

fn push_string(s: &str, out: &mut Vec<Artifact>) {
    // Markdown image links first: chat-style models wrap URLs in `![](...)`.
    let mut found_md = false;
    for caps in MD_IMAGE_RE.captures_iter(s) {
        let url = &caps[1];
        if url.starts_with("http://") || url.starts_with("https://") {
            out.push(Artifact::url(url));
            found_md = true;
        }
    }
    if found_md {
        return;
    }

    if s.starts_with("http://") || s.starts_with("https://") {
        out.push(Artifact::url(s));
    } else if s.len() > MIN_BASE64_LEN
        && let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(s)
    {
        out.push(Artifact::inline(bytes, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_path_collects_all_urls() {
        let data = serde_json::json!({
            "data": [
                {"url": "https://cdn.test/1.png"},
                {"url": "https://cdn.test/2.png"},
            ]
        });
        let artifacts = parse(&data, "data[*].url").unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[1].as_url(), Some("https://cdn.test/2.png"));
    }

    #[test]
    fn indexed_path_and_b64_object() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"artifact");
        let data = serde_json::json!({"data": [{"b64_json": payload}]});
        let artifacts = parse(&data, "data[0]").unwrap();
        assert_eq!(artifacts[0].as_bytes(), Some(b"artifact".as_slice()));
    }

    #[test]
    fn markdown_links_extracted_from_text() {
        let data = serde_json::json!({
            "choices": [{"message": {"content":
                "Here you go ![result](https://cdn.test/out.png \"title\") enjoy"}}]
        });
        let artifacts = parse(&data, "choices[0].message.content").unwrap();
        assert_eq!(artifacts[0].as_url(), Some("https://cdn.test/out.png"));
    }

    #[test]
    fn deep_nested_wildcard_path() {
        let data = serde_json::json!({
            "data": {"data": {"data": [{"url": "https://cdn.test/deep.png"}]}}
        });
        let artifacts = parse(&data, "data.data.data[*].url").unwrap();
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn empty_result_is_parse_error() {
        let data = serde_json::json!({"data": []});
        assert!(matches!(
            parse(&data, "data[*].url"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn short_strings_are_not_mistaken_for_base64() {
        let data = serde_json::json!({"data": [{"status": "ok"}]});
        // Path resolves to a short string; must not decode as base64.
        assert!(parse(&data, "data[0].status").is_err());
    }
}
