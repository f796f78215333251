use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{current_unix_timestamp_ms, is_expired_unix_ms, run_guarded, CooperativeCancellationToken};
use beacon_types::OrganizationNode;
use tokio::sync::RwLock;

use crate::http::{HttpService, HttpServiceConfig, StoreError};

/// Resolves an organization id to its full sub-org/component tree.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    async fn get_organization(
        &self,
        org_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<OrganizationNode, StoreError>;
}

/// Directory client for `GET {base}/organizations/{id}/tree`.
#[derive(Debug, Clone)]
pub struct HttpOrganizationDirectory {
    http: HttpService,
}

impl HttpOrganizationDirectory {
    pub fn new(config: HttpServiceConfig) -> Result<Self, StoreError> {
        Ok(Self {
            http: HttpService::new(config)?,
        })
    }
}

#[async_trait]
impl OrganizationDirectory for HttpOrganizationDirectory {
    #[tracing::instrument(skip(self, token))]
    async fn get_organization(
        &self,
        org_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<OrganizationNode, StoreError> {
        let url = self.http.url(&["organizations", org_id, "tree"])?;
        let call = self.http.send_with_retry(|client| client.get(url.clone()));
        let raw = run_guarded(token, Duration::ZERO, call).await??;
        let tree: OrganizationNode = serde_json::from_str(&raw)?;
        tree.validate().map_err(StoreError::InvalidResponse)?;
        Ok(tree)
    }
}

#[derive(Debug, Clone)]
struct CachedTree {
    tree: OrganizationNode,
    expires_unix_ms: Option<u64>,
}

/// TTL cache in front of another [`OrganizationDirectory`].
///
/// A zero TTL keeps entries until the process exits.
pub struct CachedOrganizationDirectory {
    inner: Arc<dyn OrganizationDirectory>,
    ttl_ms: u64,
    entries: RwLock<HashMap<String, CachedTree>>,
}

impl CachedOrganizationDirectory {
    pub fn new(inner: Arc<dyn OrganizationDirectory>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn invalidate(&self, org_id: &str) {
        self.entries.write().await.remove(org_id);
    }

    async fn cached(&self, org_id: &str, now_unix_ms: u64) -> Option<OrganizationNode> {
        let entries = self.entries.read().await;
        let entry = entries.get(org_id)?;
        if is_expired_unix_ms(entry.expires_unix_ms, now_unix_ms) {
            return None;
        }
        Some(entry.tree.clone())
    }
}

#[async_trait]
impl OrganizationDirectory for CachedOrganizationDirectory {
    async fn get_organization(
        &self,
        org_id: &str,
        token: &CooperativeCancellationToken,
    ) -> Result<OrganizationNode, StoreError> {
        let now_unix_ms = current_unix_timestamp_ms();
        if let Some(tree) = self.cached(org_id, now_unix_ms).await {
            tracing::debug!(org_id, "organization cache hit");
            return Ok(tree);
        }

        let tree = self.inner.get_organization(org_id, token).await?;
        let expires_unix_ms = (self.ttl_ms > 0).then(|| now_unix_ms.saturating_add(self.ttl_ms));
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !is_expired_unix_ms(entry.expires_unix_ms, now_unix_ms));
        entries.insert(
            org_id.to_string(),
            CachedTree {
                tree: tree.clone(),
                expires_unix_ms,
            },
        );
        Ok(tree)
    }
}
