//! Concurrency policy
//!
//! How many batch items may be in flight at once. The default policy is an
//! empirical tuning table, not a measured control loop: prompt-only calls are
//! cheap upstream and run fully parallel, while asset-editing calls are
//! throttled harder as the requested output size grows. Hosts with better
//! knowledge of their providers install their own policy function.

use std::sync::Arc;

use crate::types::OperationMode;

/// Inputs the policy may consider for one batch.
#[derive(Debug, Clone)]
pub struct ConcurrencyContext {
    pub mode: OperationMode,
    pub batch_size: usize,
    /// Requested output size/resolution, when the caller supplied one
    /// (`image_size` or `resolution` parameter).
    pub output_size: Option<String>,
}

/// Pluggable policy: context → max in-flight items (clamped to >= 1).
pub type ConcurrencyPolicy = Arc<dyn Fn(&ConcurrencyContext) -> usize + Send + Sync>;

/// Default tuning table.
pub fn default_policy() -> ConcurrencyPolicy {
    Arc::new(|ctx: &ConcurrencyContext| {
        if ctx.mode == OperationMode::TextToAsset {
            return ctx.batch_size;
        }
        let cap = match ctx
            .output_size
            .as_deref()
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("4k") => 1,
            Some("2k") | Some("1080p") => 2,
            Some("1k") | Some("720p") => 3,
            _ => 4,
        };
        cap.min(ctx.batch_size)
    })
}

/// Clamp a policy decision into a usable semaphore capacity.
pub(crate) fn effective_cap(policy: &ConcurrencyPolicy, ctx: &ConcurrencyContext) -> usize {
    policy(ctx).max(1)
}
