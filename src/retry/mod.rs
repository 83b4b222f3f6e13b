//! Retry module
//! - policy.rs: backoff policy and delay math used by the call executor

pub mod policy;

pub use policy::*;
