//! Client facade
//!
//! `BatchboxClient` wires the snapshot, selector, cache, transport and
//! policies together behind one builder-constructed entry point.
//!
//! ```rust,no_run
//! use batchbox::prelude::*;
//!
//! # async fn example() -> Result<(), batchbox::Error> {
//! let snapshot = ConfigSnapshot::from_yaml_files(
//!     std::path::Path::new("api_config.yaml"),
//!     Some(std::path::Path::new("secrets.yaml")),
//! )?;
//! let client = BatchboxClient::builder().config(snapshot).build()?;
//!
//! let response = client
//!     .generate(
//!         GenerationRequest::new("sketchwave", "a lighthouse at dusk")
//!             .with_batch_count(4)
//!             .with_seed(42),
//!     )
//!     .await?;
//! println!("{}/{} items succeeded", response.success_count(), response.items.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::account::AccountService;
use crate::cache::PayloadCache;
use crate::config::ConfigSnapshot;
use crate::error::Error;
use crate::executor::{CallExecutor, HttpTransport, ReqwestTransport};
use crate::orchestrator::{
    BatchHooks, BatchOrchestrator, ConcurrencyPolicy, GenerationRequest, GenerationResponse,
};
use crate::retry::RetryPolicy;
use crate::selection::EndpointSelector;

/// Unified client over every configured provider and model.
pub struct BatchboxClient {
    snapshot: ConfigSnapshot,
    orchestrator: BatchOrchestrator,
}

impl std::fmt::Debug for BatchboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchboxClient")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl BatchboxClient {
    pub fn builder() -> BatchboxClientBuilder {
        BatchboxClientBuilder::default()
    }

    /// Execute one generation call (cache gate, fan-out, ordered results).
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, Error> {
        self.orchestrator.run(&self.snapshot, request).await
    }

    /// Execute one generation call with host hooks (cancellation, per-item
    /// completion callback).
    pub async fn generate_with_hooks(
        &self,
        request: GenerationRequest,
        hooks: BatchHooks,
    ) -> Result<GenerationResponse, Error> {
        self.orchestrator
            .run_with_hooks(&self.snapshot, request, hooks)
            .await
    }

    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }
}

/// Builder for [`BatchboxClient`].
#[derive(Default)]
pub struct BatchboxClientBuilder {
    snapshot: Option<ConfigSnapshot>,
    retry_policy: Option<RetryPolicy>,
    concurrency_policy: Option<ConcurrencyPolicy>,
    transport: Option<Arc<dyn HttpTransport>>,
    account: Option<Arc<dyn AccountService>>,
    cache_ttl: Option<Duration>,
    keep_artifact_urls: bool,
}

impl BatchboxClientBuilder {
    /// Set the configuration snapshot (required).
    pub fn config(mut self, snapshot: ConfigSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency_policy = Some(policy);
        self
    }

    /// Install a custom transport (tests, instrumentation).
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Install the account collaborator required by `auth_type: account`
    /// endpoints.
    pub fn account(mut self, account: Arc<dyn AccountService>) -> Self {
        self.account = Some(account);
        self
    }

    /// Expire cached payloads after this duration.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Keep URL artifacts as references instead of downloading them.
    pub fn keep_artifact_urls(mut self) -> Self {
        self.keep_artifact_urls = true;
        self
    }

    pub fn build(self) -> Result<BatchboxClient, Error> {
        let snapshot = self
            .snapshot
            .ok_or_else(|| Error::Config("client requires a configuration snapshot".to_string()))?;

        let problems = snapshot.validate();
        if !problems.is_empty() {
            return Err(Error::Config(format!(
                "invalid configuration: {}",
                problems.join("; ")
            )));
        }

        let retry_policy = self.retry_policy.unwrap_or_else(|| {
            let settings = snapshot.settings();
            RetryPolicy::default()
                .with_max_attempts(settings.max_retries.max(1))
                .with_initial_delay(Duration::from_millis(
                    (settings.retry_delay * 1000.0) as u64,
                ))
        });

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let executor = CallExecutor::new(
            transport,
            Arc::new(EndpointSelector::new()),
            retry_policy,
            self.account,
        )
        .with_download_artifacts(!self.keep_artifact_urls);

        let cache = Arc::new(PayloadCache::new(self.cache_ttl));
        let mut orchestrator = BatchOrchestrator::new(Arc::new(executor), cache);
        if let Some(policy) = self.concurrency_policy {
            orchestrator = orchestrator.with_concurrency_policy(policy);
        }

        Ok(BatchboxClient {
            snapshot,
            orchestrator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_fixtures;

    #[test]
    fn builder_requires_a_snapshot() {
        let err = BatchboxClient::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn builder_rejects_invalid_snapshots() {
        let snapshot = ConfigSnapshot::from_yaml(
            "providers:\n  bad:\n    base_url: not-a-url\nmodels: {}\n",
            None,
        )
        .unwrap();
        let err = BatchboxClient::builder().config(snapshot).build().unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("invalid URL")));
    }

    #[test]
    fn builder_accepts_the_fixture_snapshot() {
        let client = BatchboxClient::builder()
            .config(test_fixtures::snapshot())
            .build()
            .unwrap();
        assert!(client.snapshot().model("sketchwave").is_some());
    }
}
