//! Core data types shared across the crate.
//!
//! Everything here is plain data: wire-format selectors, task and artifact
//! shapes, and the per-item outcome collected by the orchestrator. Behavior
//! lives in the modules that consume these types.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Wire protocol family an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

/// How credentials reach the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// `Authorization: Bearer <key>` header.
    #[default]
    Bearer,
    /// No auth header; the key is embedded in the URL query string.
    #[serde(rename = "none")]
    QueryKey,
    /// Session token from the account collaborator (`X-Auth-T` header).
    Account,
}

/// Naming convention for multiple uploaded files in a multipart body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// `image`, `image`, ... (repeated field name)
    #[default]
    SameName,
    /// `image[0]`, `image[1]`, ...
    Indexed,
    /// `images[]`, `images[]`, ...
    Array,
    /// `image1`, `image2`, ...
    Numbered,
}

impl FileFormat {
    /// Field name for the `index`-th uploaded file.
    pub fn field_name(&self, base: &str, index: usize) -> String {
        match self {
            Self::SameName => base.to_string(),
            Self::Indexed => format!("{base}[{index}]"),
            Self::Array => format!("{base}[]"),
            Self::Numbered => format!("{base}{}", index + 1),
        }
    }
}

/// Operation variant of a model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Generate an asset from a text prompt alone.
    TextToAsset,
    /// Transform one or more input assets guided by a prompt.
    AssetToAsset,
}

impl OperationMode {
    /// The mode to try when an endpoint does not configure this one.
    pub fn fallback(&self) -> Self {
        match self {
            Self::TextToAsset => Self::AssetToAsset,
            Self::AssetToAsset => Self::TextToAsset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToAsset => "text_to_asset",
            Self::AssetToAsset => "asset_to_asset",
        }
    }
}

/// Body encoding for the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentKind {
    #[default]
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "multipart/form-data")]
    Multipart,
}

/// Whether the endpoint answers inline or hands back a task id to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    #[default]
    Sync,
    Async,
}

/// An uploaded input asset: opaque bytes plus MIME type.
///
/// The base64 encoding is computed once at construction and shared across all
/// batch items, so JSON-body protocols never re-encode per request.
#[derive(Clone)]
pub struct Asset {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: String,
    encoded: String,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Asset {
    /// Build an asset from raw bytes. MIME is sniffed when not supplied.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>, mime: Option<String>) -> Self {
        let mime = mime.unwrap_or_else(|| {
            infer::get(&bytes)
                .map(|kind| kind.mime_type().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string())
        });
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Self {
            filename: filename.into(),
            bytes,
            mime,
            encoded,
        }
    }

    /// Build an asset from base64 input, accepting a raw string or a
    /// `data:<mime>;base64,` URL.
    pub fn from_base64(filename: impl Into<String>, data: &str) -> Result<Self, Error> {
        let (mime_hint, payload) = match data.split_once(',') {
            Some((head, rest)) if head.starts_with("data:") => {
                let mime = head
                    .trim_start_matches("data:")
                    .split(';')
                    .next()
                    .filter(|m| !m.is_empty())
                    .map(|m| m.to_string());
                (mime, rest)
            }
            _ => (None, data),
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::Build(format!("undecodable asset data: {e}")))?;
        let mut asset = Self::from_bytes(filename, bytes, mime_hint);
        // Reuse the caller's encoding instead of round-tripping.
        asset.encoded = payload.trim().to_string();
        Ok(asset)
    }

    /// Cached standard base64 encoding of the bytes.
    pub fn base64(&self) -> &str {
        &self.encoded
    }

    /// `data:<mime>;base64,<payload>` form for chat-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.encoded)
    }
}

/// One unit of generation work. Immutable once dispatched.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub model: String,
    pub mode: OperationMode,
    pub prompt: String,
    /// Per-item seed (already offset by batch index). Zero means "unseeded".
    pub seed: u64,
    pub batch_index: usize,
    /// Dynamic parameters merged into the outgoing payload.
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Input assets, shared across sibling batch items.
    pub assets: std::sync::Arc<Vec<Asset>>,
}

/// A generated artifact: inline bytes or a reference the caller can fetch.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: ArtifactData,
    pub mime: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ArtifactData {
    Inline(Vec<u8>),
    Url(String),
}

impl Artifact {
    pub fn inline(bytes: Vec<u8>, mime: Option<String>) -> Self {
        Self {
            data: ArtifactData::Inline(bytes),
            mime,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            data: ArtifactData::Url(url.into()),
            mime: None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match &self.data {
            ArtifactData::Url(u) => Some(u),
            ArtifactData::Inline(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ArtifactData::Inline(b) => Some(b),
            ArtifactData::Url(_) => None,
        }
    }
}

/// Successful outcome of one batch item.
#[derive(Debug, Clone)]
pub struct ItemSuccess {
    pub artifacts: Vec<Artifact>,
    /// Provider that ultimately served the request.
    pub provider: String,
    /// Endpoint attempts consumed (1 = first endpoint succeeded).
    pub attempts: u32,
}

/// Per-item outcome: success payload or the structured failure that ended it.
pub type ItemOutcome = Result<ItemSuccess, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_format_naming() {
        assert_eq!(FileFormat::SameName.field_name("image", 1), "image");
        assert_eq!(FileFormat::Indexed.field_name("image", 1), "image[1]");
        assert_eq!(FileFormat::Array.field_name("images", 2), "images[]");
        assert_eq!(FileFormat::Numbered.field_name("image", 0), "image1");
    }

    #[test]
    fn asset_from_data_url_keeps_mime_and_encoding() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
        let asset =
            Asset::from_base64("input.png", &format!("data:image/png;base64,{payload}")).unwrap();
        assert_eq!(asset.mime, "image/png");
        assert_eq!(asset.bytes, b"png-bytes");
        assert_eq!(asset.base64(), payload);
    }

    #[test]
    fn asset_from_invalid_base64_is_a_build_error() {
        let err = Asset::from_base64("x", "!!not-base64!!").unwrap_err();
        assert!(matches!(err, Error::Build(_)));
    }

    #[test]
    fn mode_fallback_is_symmetric() {
        assert_eq!(
            OperationMode::TextToAsset.fallback(),
            OperationMode::AssetToAsset
        );
        assert_eq!(
            OperationMode::AssetToAsset.fallback().fallback(),
            OperationMode::AssetToAsset
        );
    }
}
