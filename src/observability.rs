//! Observability helpers
//!
//! The library itself only emits `tracing` events; hosts that want output on
//! stderr without wiring their own subscriber can call [`init_tracing`].

use crate::error::Error;

/// Install a formatted `tracing` subscriber.
///
/// `filter` uses env-filter syntax (e.g. `"batchbox=debug,info"`); when it
/// does not parse, `RUST_LOG` and then `info` apply. Safe to call when a
/// subscriber is already installed; that case is reported as an error the
/// caller may ignore.
pub fn init_tracing(filter: &str) -> Result<(), Error> {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Internal(format!("tracing subscriber already installed: {e}")))
}
