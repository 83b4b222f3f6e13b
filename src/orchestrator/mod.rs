//! Batch orchestrator
//!
//! Fans a generation call out into N batch items under an adaptive
//! concurrency cap, collects per-item outcomes back into submission order,
//! and tolerates partial failure: one item's fatal error never cancels its
//! siblings. The fingerprint cache gates the whole call before any network
//! work happens.

pub mod concurrency;

pub use concurrency::{ConcurrencyContext, ConcurrencyPolicy, default_policy};

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::cache::{Fingerprint, PayloadCache};
use crate::config::{ConfigSnapshot, EndpointStrategy};
use crate::error::Error;
use crate::executor::CallExecutor;
use crate::selection::SelectionMode;
use crate::types::{Asset, GenerationTask, ItemOutcome, OperationMode};
use crate::utils::cancel::CancelHandle;

/// One inbound generation call, before fan-out.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    /// Base seed; item `i` runs with `seed + i`. Zero leaves items unseeded.
    pub seed: u64,
    pub batch_count: usize,
    pub extra_params: serde_json::Map<String, serde_json::Value>,
    pub assets: Vec<Asset>,
    /// Pin a specific endpoint by name (manual selection, no fallback).
    pub endpoint_override: Option<String>,
    /// Skip the fingerprint cache lookup for this call.
    pub skip_cache: bool,
    /// Pre-computed fingerprint supplied by the host, if any.
    pub fingerprint: Option<Fingerprint>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            seed: 0,
            batch_count: 1,
            extra_params: serde_json::Map::new(),
            assets: Vec::new(),
            endpoint_override: None,
            skip_cache: false,
            fingerprint: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_batch_count(mut self, batch_count: usize) -> Self {
        self.batch_count = batch_count;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }

    pub fn with_assets(mut self, assets: Vec<Asset>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_endpoint_override(mut self, name: impl Into<String>) -> Self {
        self.endpoint_override = Some(name.into());
        self
    }

    pub fn with_skip_cache(mut self, skip: bool) -> Self {
        self.skip_cache = skip;
        self
    }

    /// Supply a fingerprint computed elsewhere instead of re-deriving it.
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Operation mode implied by the presence of input assets.
    pub fn mode(&self) -> OperationMode {
        if self.assets.is_empty() {
            OperationMode::TextToAsset
        } else {
            OperationMode::AssetToAsset
        }
    }
}

/// Ordered per-item outcomes plus the call fingerprint.
#[derive(Debug)]
pub struct GenerationResponse {
    /// One entry per submitted item, in submission order.
    pub items: Vec<ItemOutcome>,
    pub fingerprint: Fingerprint,
    /// Whether the payload came from the fingerprint cache.
    pub from_cache: bool,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl GenerationResponse {
    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_ok()).count()
    }

    /// At least one item succeeded.
    pub fn is_partial_success(&self) -> bool {
        self.success_count() > 0
    }

    pub fn is_complete_success(&self) -> bool {
        self.success_count() == self.items.len()
    }
}

/// Per-run host hooks.
#[derive(Default, Clone)]
pub struct BatchHooks {
    /// Abort signal: queued items stop being admitted once set.
    pub cancel: CancelHandle,
    /// Invoked as each item finishes, in completion order. Hosts use this to
    /// persist artifacts as they arrive.
    pub on_item_complete: Option<Arc<dyn Fn(usize, &ItemOutcome) + Send + Sync>>,
}

pub struct BatchOrchestrator {
    executor: Arc<CallExecutor>,
    cache: Arc<PayloadCache>,
    policy: ConcurrencyPolicy,
}

impl BatchOrchestrator {
    pub fn new(executor: Arc<CallExecutor>, cache: Arc<PayloadCache>) -> Self {
        Self {
            executor,
            cache,
            policy: default_policy(),
        }
    }

    pub fn with_concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run a batch with default hooks.
    pub async fn run(
        &self,
        snapshot: &ConfigSnapshot,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, Error> {
        self.run_with_hooks(snapshot, request, BatchHooks::default())
            .await
    }

    /// Run a batch: cache gate → fan-out under the semaphore → ordered
    /// collection → cache store on full success.
    pub async fn run_with_hooks(
        &self,
        snapshot: &ConfigSnapshot,
        request: GenerationRequest,
        hooks: BatchHooks,
    ) -> Result<GenerationResponse, Error> {
        if request.batch_count == 0 {
            return Err(Error::Build("batch_count must be at least 1".to_string()));
        }

        let mode = request.mode();
        let fingerprint = request.fingerprint.clone().unwrap_or_else(|| {
            Fingerprint::compute(
                &request.model,
                &request.prompt,
                request.batch_count,
                &request.extra_params,
            )
        });

        if !request.skip_cache
            && let Some(cached) = self.cache.lookup(&fingerprint)
        {
            tracing::info!(
                model = %request.model,
                fingerprint = %fingerprint,
                "returning cached batch payload"
            );
            return Ok(GenerationResponse {
                items: cached.into_iter().map(Ok).collect(),
                fingerprint,
                from_cache: true,
                completed_at: chrono::Utc::now(),
            });
        }

        let selection = match &request.endpoint_override {
            Some(name) => SelectionMode::Manual(name.clone()),
            None => match snapshot.settings().endpoint_strategy {
                EndpointStrategy::Failover => SelectionMode::Failover,
                EndpointStrategy::RoundRobin => SelectionMode::RoundRobin,
            },
        };

        let cap = concurrency::effective_cap(
            &self.policy,
            &ConcurrencyContext {
                mode,
                batch_size: request.batch_count,
                output_size: output_size_of(&request.extra_params),
            },
        );
        let batch_id = uuid::Uuid::new_v4();
        tracing::info!(
            batch_id = %batch_id,
            model = %request.model,
            batch_count = request.batch_count,
            mode = mode.as_str(),
            concurrency = cap,
            "starting batch"
        );

        // Assets decoded once, shared by every item.
        let shared_assets = Arc::new(request.assets.clone());
        let semaphore = Arc::new(Semaphore::new(cap));

        let futures: Vec<_> = (0..request.batch_count)
            .map(|index| {
                let task = GenerationTask {
                    model: request.model.clone(),
                    mode,
                    prompt: request.prompt.clone(),
                    seed: if request.seed > 0 {
                        request.seed + index as u64
                    } else {
                        0
                    },
                    batch_index: index,
                    params: request.extra_params.clone(),
                    assets: shared_assets.clone(),
                };
                let semaphore = semaphore.clone();
                let executor = self.executor.clone();
                let cancel = hooks.cancel.clone();
                let on_item_complete = hooks.on_item_complete.clone();
                let selection = &selection;
                async move {
                    let outcome = Self::run_item(
                        snapshot, &executor, &semaphore, &cancel, selection, &task,
                    )
                    .await;
                    if let Some(callback) = &on_item_complete {
                        callback(index, &outcome);
                    }
                    outcome
                }
            })
            .collect();

        // join_all keeps submission order regardless of completion order.
        let items = join_all(futures).await;

        let successes = items.iter().filter(|item| item.is_ok()).count();
        tracing::info!(
            batch_id = %batch_id,
            model = %request.model,
            successes,
            failures = items.len() - successes,
            "batch finished"
        );

        if successes == items.len() {
            let payload: Vec<_> = items
                .iter()
                .filter_map(|item| item.as_ref().ok().cloned())
                .collect();
            self.cache.store(fingerprint.clone(), payload);
        }

        Ok(GenerationResponse {
            items,
            fingerprint,
            from_cache: false,
            completed_at: chrono::Utc::now(),
        })
    }

    async fn run_item(
        snapshot: &ConfigSnapshot,
        executor: &CallExecutor,
        semaphore: &Semaphore,
        cancel: &CancelHandle,
        selection: &SelectionMode,
        task: &GenerationTask,
    ) -> ItemOutcome {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| Error::Internal("batch semaphore closed".to_string()))?;
        // Re-check after waiting: the batch may have been aborted while this
        // item sat in the queue.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        executor.execute(snapshot, task, selection).await
    }
}

fn output_size_of(params: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    params
        .get("image_size")
        .or_else(|| params.get("resolution"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_follows_assets() {
        let bare = GenerationRequest::new("m", "p");
        assert_eq!(bare.mode(), OperationMode::TextToAsset);
        let with_asset = bare.with_assets(vec![Asset::from_bytes(
            "a.png",
            b"x".to_vec(),
            Some("image/png".into()),
        )]);
        assert_eq!(with_asset.mode(), OperationMode::AssetToAsset);
    }

    #[test]
    fn output_size_reads_either_parameter() {
        let mut params = serde_json::Map::new();
        assert_eq!(output_size_of(&params), None);
        params.insert("resolution".to_string(), serde_json::json!("1080p"));
        assert_eq!(output_size_of(&params).as_deref(), Some("1080p"));
        params.insert("image_size".to_string(), serde_json::json!("2K"));
        assert_eq!(output_size_of(&params).as_deref(), Some("2K"));
    }
}
