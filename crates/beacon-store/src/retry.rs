//! Backoff schedule for outbound collaborator calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

const BASE_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_DOUBLINGS: usize = 5;

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static JITTER_SEED: AtomicU64 = AtomicU64::new(1);

/// Retry limits of one HTTP collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub max_retries: usize,
    /// Total time the retries of one call may take; zero is unbounded.
    pub budget_ms: u64,
    pub jitter: bool,
}

impl RetryPolicy {
    /// 408, 409, 425, 429 and every 5xx are transient.
    pub fn is_transient_status(status: u16) -> bool {
        matches!(status, 408 | 409 | 425 | 429) || status >= 500
    }

    pub fn is_transient_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
    }

    /// Delay before retry number `attempt + 1`, or `None` when the call
    /// should give up.
    pub fn delay_before_retry(
        &self,
        attempt: usize,
        started: Instant,
        retry_after_ms: Option<u64>,
    ) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let backoff_ms = self.backoff_ms(attempt).max(retry_after_ms.unwrap_or(0));
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if self.budget_ms > 0 && elapsed_ms.saturating_add(backoff_ms) > self.budget_ms {
            return None;
        }
        Some(Duration::from_millis(backoff_ms))
    }

    /// Exponential backoff, jittered into `[50%, 100%]` when enabled.
    fn backoff_ms(&self, attempt: usize) -> u64 {
        let full = BASE_BACKOFF_MS.saturating_mul(1_u64 << attempt.min(MAX_BACKOFF_DOUBLINGS));
        if !self.jitter {
            return full;
        }
        let floor = full / 2;
        let seed = JITTER_SEED.fetch_add(1, Ordering::Relaxed);
        let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
        floor + mixed % (full - floor + 1)
    }
}

/// `Retry-After` as milliseconds; accepts delta seconds or an HTTP date.
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1_000));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delta_ms = (retry_at - Utc::now()).num_milliseconds();
    Some(u64::try_from(delta_ms).unwrap_or(0))
}

/// Correlation id sent with every outbound request.
pub(crate) fn next_request_id() -> String {
    let sequence = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("beacon-{}-{sequence}", beacon_core::current_unix_timestamp_ms())
}
