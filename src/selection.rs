//! Endpoint selection
//!
//! Chooses which endpoint(s) a logical call may attempt, in manual,
//! round-robin, or failover mode. The round-robin rotation index is per-model
//! state that lives for the process lifetime; it is owned by this object and
//! mutated only under its mutex so concurrent tasks never observe a torn
//! index.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::{ConfigSnapshot, EndpointConfig};
use crate::error::Error;

/// How the caller wants endpoints picked for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    /// Pin one endpoint by display name (or provider name). No fallback.
    Manual(String),
    /// Rotate the starting endpoint across calls.
    RoundRobin,
    /// Always start at the highest-priority endpoint.
    Failover,
}

/// Ordered attempt plan for one logical call. Immutable once produced.
#[derive(Debug)]
pub struct SelectionPlan {
    pub endpoints: Vec<EndpointConfig>,
    /// Whether a retryable failure may advance to the next endpoint.
    pub advance_on_failure: bool,
}

#[derive(Default)]
pub struct EndpointSelector {
    rotation: Mutex<HashMap<String, usize>>,
}

impl EndpointSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the attempt plan for one call.
    pub fn plan(
        &self,
        snapshot: &ConfigSnapshot,
        model: &str,
        mode: &SelectionMode,
    ) -> Result<SelectionPlan, Error> {
        let usable: Vec<EndpointConfig> = snapshot
            .endpoints_for(model)?
            .into_iter()
            .filter(|ep| {
                let ok = snapshot.provider(&ep.provider).is_some_and(|p| p.has_api_key());
                if !ok {
                    tracing::debug!(
                        model,
                        endpoint = ep.name(),
                        "skipping endpoint without usable provider credentials"
                    );
                }
                ok
            })
            .cloned()
            .collect();
        if usable.is_empty() {
            return Err(Error::Config(format!(
                "model '{model}': no endpoint with usable credentials"
            )));
        }

        match mode {
            SelectionMode::Manual(name) => {
                let pinned = usable
                    .iter()
                    .find(|ep| ep.name() == name || ep.provider == *name)
                    .cloned()
                    .ok_or_else(|| {
                        Error::Config(format!("model '{model}': endpoint '{name}' not found"))
                    })?;
                Ok(SelectionPlan {
                    endpoints: vec![pinned],
                    advance_on_failure: false,
                })
            }
            SelectionMode::Failover => Ok(SelectionPlan {
                endpoints: usable,
                advance_on_failure: true,
            }),
            SelectionMode::RoundRobin => {
                let start = self.advance(model, usable.len());
                let mut rotated = usable;
                rotated.rotate_left(start);
                Ok(SelectionPlan {
                    endpoints: rotated,
                    advance_on_failure: true,
                })
            }
        }
    }

    /// Read-modify-write of the shared rotation index; one lock per call.
    fn advance(&self, model: &str, len: usize) -> usize {
        let mut rotation = self.rotation.lock().expect("selector lock poisoned");
        let slot = rotation.entry(model.to_string()).or_insert(0);
        let current = *slot % len;
        *slot = (current + 1) % len;
        current
    }
}
