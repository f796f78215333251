use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{current_unix_timestamp_ms, is_expired_unix_ms, run_guarded, CooperativeCancellationToken};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::http::{HttpService, HttpServiceConfig, StoreError};

/// Automations service: branch ids to automation ids and branch names.
#[async_trait]
pub trait BranchService: Send + Sync {
    async fn automations_for_branch(
        &self,
        branch_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<Vec<String>, StoreError>;

    /// Returns `None` when the service does not know the branch.
    async fn branch_name_for_id(
        &self,
        branch_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<Option<String>, StoreError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutomationsResponse {
    #[serde(default)]
    automation_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    name: Option<String>,
}

/// HTTP client for the automations service.
#[derive(Debug, Clone)]
pub struct HttpBranchService {
    http: HttpService,
}

impl HttpBranchService {
    pub fn new(config: HttpServiceConfig) -> Result<Self, StoreError> {
        Ok(Self {
            http: HttpService::new(config)?,
        })
    }
}

#[async_trait]
impl BranchService for HttpBranchService {
    #[tracing::instrument(skip(self, token))]
    async fn automations_for_branch(
        &self,
        branch_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<Vec<String>, StoreError> {
        let url = self.http.url(&["branches", branch_id, "automations"])?;
        let call = self.http.send_with_retry(|client| client.get(url.clone()));
        let raw = run_guarded(token, Duration::ZERO, call).await??;
        let parsed: AutomationsResponse = serde_json::from_str(&raw)?;
        Ok(parsed.automation_ids)
    }

    #[tracing::instrument(skip(self, token))]
    async fn branch_name_for_id(
        &self,
        branch_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<Option<String>, StoreError> {
        let url = self.http.url(&["branches", branch_id])?;
        let call = self.http.send_with_retry(|client| client.get(url.clone()));
        let raw = match run_guarded(token, Duration::ZERO, call).await? {
            Ok(raw) => raw,
            Err(StoreError::HttpStatus { status: 404, .. }) => return Ok(None),
            Err(error) => return Err(error),
        };
        let parsed: BranchResponse = serde_json::from_str(&raw)?;
        Ok(parsed.name.filter(|name| !name.trim().is_empty()))
    }
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    expires_unix_ms: Option<u64>,
}

/// Process-wide branch-to-automation cache in front of a [`BranchService`].
///
/// A zero TTL keeps entries until the process exits.
pub struct CachedBranchService {
    inner: Arc<dyn BranchService>,
    ttl_ms: u64,
    automations: RwLock<HashMap<String, Cached<Vec<String>>>>,
    names: RwLock<HashMap<String, Cached<Option<String>>>>,
}

impl CachedBranchService {
    pub fn new(inner: Arc<dyn BranchService>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            automations: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
        }
    }

    fn expiry(&self, now_unix_ms: u64) -> Option<u64> {
        (self.ttl_ms > 0).then(|| now_unix_ms.saturating_add(self.ttl_ms))
    }
}

async fn remember<T>(
    cache: &RwLock<HashMap<String, Cached<T>>>,
    key: &str,
    value: T,
    expires_unix_ms: Option<u64>,
    now_unix_ms: u64,
) {
    let mut entries = cache.write().await;
    entries.retain(|_, entry| !is_expired_unix_ms(entry.expires_unix_ms, now_unix_ms));
    entries.insert(
        key.to_string(),
        Cached {
            value,
            expires_unix_ms,
        },
    );
}

async fn lookup<T: Clone>(
    cache: &RwLock<HashMap<String, Cached<T>>>,
    key: &str,
    now_unix_ms: u64,
) -> Option<T> {
    let entries = cache.read().await;
    let entry = entries.get(key)?;
    if is_expired_unix_ms(entry.expires_unix_ms, now_unix_ms) {
        return None;
    }
    Some(entry.value.clone())
}

#[async_trait]
impl BranchService for CachedBranchService {
    async fn automations_for_branch(
        &self,
        branch_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<Vec<String>, StoreError> {
        let now_unix_ms = current_unix_timestamp_ms();
        if let Some(ids) = lookup(&self.automations, branch_id, now_unix_ms).await {
            tracing::debug!(branch_id, "automation cache hit");
            return Ok(ids);
        }
        let ids = self.inner.automations_for_branch(branch_id, token).await?;
        remember(
            &self.automations,
            branch_id,
            ids.clone(),
            self.expiry(now_unix_ms),
            now_unix_ms,
        )
        .await;
        Ok(ids)
    }

    async fn branch_name_for_id(
        &self,
        branch_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<Option<String>, StoreError> {
        let now_unix_ms = current_unix_timestamp_ms();
        if let Some(name) = lookup(&self.names, branch_id, now_unix_ms).await {
            return Ok(name);
        }
        let name = self.inner.branch_name_for_id(branch_id, token).await?;
        remember(
            &self.names,
            branch_id,
            name.clone(),
            self.expiry(now_unix_ms),
            now_unix_ms,
        )
        .await;
        Ok(name)
    }
}
