//! Foundational low-level utilities shared across Beacon crates.
//!
//! Provides the cooperative cancellation token threaded through every external
//! call plus the time helpers used by cache expiry.

pub mod cancellation;
pub mod time_utils;

pub use cancellation::{run_guarded, CooperativeCancellationToken, GuardedCallError};
pub use time_utils::{current_unix_timestamp_ms, is_expired_unix_ms};
