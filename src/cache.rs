//! Parameter fingerprinting and the result cache.
//!
//! The fingerprint is the dedup key for a whole generation call: two calls
//! with the same logical parameters must hash identically no matter which
//! call site computes it or how the caller ordered its parameter map. The
//! canonical form (sorted keys, compact separators) matches what a
//! `JSON.stringify`-style serializer produces, so independent frontends can
//! compute the same value.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::ItemSuccess;

/// Deterministic hash identifying a logically-identical generation call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a call.
    ///
    /// The seed is deliberately absent: reseeding the same request must map
    /// to the same fingerprint. A `seed` key inside `extra_params` is
    /// stripped for the same reason.
    pub fn compute(
        model: &str,
        prompt: &str,
        batch_count: usize,
        extra_params: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut params = extra_params.clone();
        params.remove("seed");
        let normalized = canonical_json(&serde_json::Value::Object(params));
        let digest = md5::compute(format!("{model}|{prompt}|{batch_count}|{normalized}"));
        Self(format!("{digest:x}"))
    }

    /// Wrap a fingerprint computed elsewhere (e.g. supplied by the host).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize with sorted object keys and no extraneous whitespace.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        serde_json::Value::Array(items) => {
            let entries: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", entries.join(","))
        }
        other => other.to_string(),
    }
}

struct CacheEntry {
    items: Vec<ItemSuccess>,
    created_at: Instant,
}

/// Process-wide fingerprint → payload cache.
///
/// `lookup` never touches the network; `store` only ever records payloads
/// from fully successful calls (the orchestrator enforces this). Entries
/// optionally expire after a TTL; expiry is the only eviction.
pub struct PayloadCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    ttl: Option<Duration>,
}

impl PayloadCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Vec<ItemSuccess>> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let expired = match entries.get(fingerprint) {
            Some(entry) => self.ttl.is_some_and(|ttl| entry.created_at.elapsed() > ttl),
            None => return None,
        };
        if expired {
            entries.remove(fingerprint);
            return None;
        }
        entries.get(fingerprint).map(|entry| entry.items.clone())
    }

    pub fn store(&self, fingerprint: Fingerprint, items: Vec<ItemSuccess>) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            fingerprint,
            CacheEntry {
                items,
                created_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PayloadCache {
    fn default() -> Self {
        Self::new(None)
    }
}
