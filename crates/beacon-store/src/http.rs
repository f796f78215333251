use std::time::{Duration, Instant};

use beacon_core::GuardedCallError;
use beacon_types::WidgetError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use thiserror::Error;
use tokio::time::sleep;

use crate::retry::{next_request_id, retry_after_ms, RetryPolicy};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_RETRIES: usize = 2;

/// Errors raised by outbound HTTP collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid service url: {0}")]
    InvalidUrl(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl From<GuardedCallError> for StoreError {
    fn from(error: GuardedCallError) -> Self {
        match error {
            GuardedCallError::Cancelled => Self::Cancelled,
            GuardedCallError::TimedOut { timeout_ms } => Self::TimedOut { timeout_ms },
        }
    }
}

impl StoreError {
    /// Maps an analytics store failure onto the request error taxonomy.
    pub fn into_store_error(self) -> WidgetError {
        match self {
            Self::Cancelled => WidgetError::Cancelled,
            Self::TimedOut { timeout_ms } => WidgetError::Timeout { timeout_ms },
            other => WidgetError::StoreTransport {
                detail: other.to_string(),
            },
        }
    }

    /// Maps a directory or automations service failure.
    pub fn into_service_error(self, service: &'static str) -> WidgetError {
        match self {
            Self::Cancelled => WidgetError::Cancelled,
            Self::TimedOut { timeout_ms } => WidgetError::Timeout { timeout_ms },
            other => WidgetError::ServiceUnavailable {
                service,
                detail: other.to_string(),
            },
        }
    }
}

/// Connection settings shared by the HTTP collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServiceConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

impl HttpServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_budget_ms: 0,
            retry_jitter: true,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// reqwest client plus the retry loop used by every collaborator.
#[derive(Debug, Clone)]
pub(crate) struct HttpService {
    client: reqwest::Client,
    config: HttpServiceConfig,
}

impl HttpService {
    pub(crate) fn new(config: HttpServiceConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            let bearer = format!("Bearer {token}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer).map_err(|error| {
                    StoreError::InvalidResponse(format!("invalid API token header: {error}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    pub(crate) fn config(&self) -> &HttpServiceConfig {
        &self.config
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<reqwest::Url, StoreError> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = reqwest::Url::parse(base)
            .map_err(|error| StoreError::InvalidUrl(format!("{base}: {error}")))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::InvalidUrl(base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            budget_ms: self.config.retry_budget_ms,
            jitter: self.config.retry_jitter,
        }
    }

    /// Sends the request built by `build`, retrying transient failures, and
    /// returns the body of the first successful response.
    pub(crate) async fn send_with_retry<F>(&self, build: F) -> Result<String, StoreError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let policy = self.retry_policy();
        let started = Instant::now();
        let mut attempt = 0_usize;

        loop {
            let sent = build(&self.client)
                .header("x-beacon-request-id", next_request_id())
                .header("x-beacon-retry-attempt", attempt.to_string())
                .send()
                .await;

            let (failure, retry_after) = match sent {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.text().await?);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = retry_after_ms(response.headers());
                    let body = response.text().await?;
                    let failure = StoreError::HttpStatus { status, body };
                    if !RetryPolicy::is_transient_status(status) {
                        return Err(failure);
                    }
                    (failure, retry_after)
                }
                Err(error) if RetryPolicy::is_transient_error(&error) => (StoreError::Http(error), None),
                Err(error) => return Err(StoreError::Http(error)),
            };

            let Some(delay) = policy.delay_before_retry(attempt, started, retry_after) else {
                return Err(failure);
            };
            tracing::debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "retrying collaborator request"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
