use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{run_guarded, CooperativeCancellationToken};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{json, Value};

use crate::http::{HttpService, HttpServiceConfig, StoreError};

/// One composed query addressed to a store index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub name: String,
    pub alias: String,
    pub body: Value,
}

/// Per-query result of a multi-search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Hit(Value),
    Failed(String),
}

/// Multi-search facility of the analytics store.
///
/// Implementations return one outcome per request, in request order. A
/// transport failure fails the whole batch.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn multi_search(
        &self,
        requests: &[SearchRequest],
        token: &CooperativeCancellationToken,
    ) -> Result<Vec<SearchOutcome>, StoreError>;
}

/// `_msearch` client speaking the NDJSON multi-search protocol.
#[derive(Debug, Clone)]
pub struct HttpAnalyticsStore {
    http: HttpService,
}

impl HttpAnalyticsStore {
    pub fn new(config: HttpServiceConfig) -> Result<Self, StoreError> {
        Ok(Self {
            http: HttpService::new(config)?,
        })
    }

    fn msearch_url(&self) -> Result<reqwest::Url, StoreError> {
        let base = self.http.config().base_url.trim_end_matches('/');
        if base.ends_with("/_msearch") {
            return self.http.url(&[]);
        }
        self.http.url(&["_msearch"])
    }
}

/// Encodes header/body line pairs; every line ends with a newline.
pub(crate) fn encode_msearch_body(requests: &[SearchRequest]) -> Result<String, StoreError> {
    let mut payload = String::new();
    for request in requests {
        payload.push_str(&serde_json::to_string(&json!({ "index": request.alias }))?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(&request.body)?);
        payload.push('\n');
    }
    Ok(payload)
}

pub(crate) fn parse_msearch_response(
    raw: &str,
    expected: usize,
) -> Result<Vec<SearchOutcome>, StoreError> {
    let parsed: Value = serde_json::from_str(raw)?;
    let Some(responses) = parsed.get("responses").and_then(Value::as_array) else {
        return Err(StoreError::InvalidResponse(
            "multi-search response has no responses array".to_string(),
        ));
    };
    if responses.len() != expected {
        return Err(StoreError::InvalidResponse(format!(
            "multi-search returned {} responses for {expected} queries",
            responses.len()
        )));
    }
    Ok(responses.iter().map(classify_response).collect())
}

fn classify_response(response: &Value) -> SearchOutcome {
    if let Some(error) = response.get("error") {
        let reason = error
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("search_error");
        return SearchOutcome::Failed(reason.to_string());
    }
    let status = response.get("status").and_then(Value::as_u64).unwrap_or(200);
    if status >= 400 {
        return SearchOutcome::Failed(format!("status_{status}"));
    }
    SearchOutcome::Hit(response.clone())
}

#[async_trait]
impl AnalyticsStore for HttpAnalyticsStore {
    async fn multi_search(
        &self,
        requests: &[SearchRequest],
        token: &CooperativeCancellationToken,
    ) -> Result<Vec<SearchOutcome>, StoreError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let payload = encode_msearch_body(requests)?;
        let url = self.msearch_url()?;
        let call = self.http.send_with_retry(|client| {
            client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(payload.clone())
        });
        let raw = run_guarded(token, Duration::ZERO, call).await??;
        parse_msearch_response(&raw, requests.len())
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::CooperativeCancellationToken;
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{
        encode_msearch_body, parse_msearch_response, AnalyticsStore, HttpAnalyticsStore,
        SearchOutcome, SearchRequest,
    };
    use crate::{HttpServiceConfig, StoreError};

    fn request(name: &str, alias: &str) -> SearchRequest {
        SearchRequest {
            name: name.to_string(),
            alias: alias.to_string(),
            body: json!({"size": 0}),
        }
    }

    fn config(base_url: String) -> HttpServiceConfig {
        HttpServiceConfig {
            max_retries: 1,
            retry_jitter: false,
            ..HttpServiceConfig::new(base_url)
        }
    }

    #[test]
    fn unit_msearch_body_is_newline_terminated_ndjson() {
        let body = encode_msearch_body(&[request("a", "idx-a"), request("b", "idx-b")])
            .expect("encode");
        assert_eq!(
            body,
            "{\"index\":\"idx-a\"}\n{\"size\":0}\n{\"index\":\"idx-b\"}\n{\"size\":0}\n"
        );
    }

    #[test]
    fn functional_parse_marks_per_query_errors() {
        let raw = json!({"responses": [
            {"aggregations": {"x": {"value": 1}}, "status": 200},
            {"error": {"type": "index_not_found_exception"}, "status": 404}
        ]})
        .to_string();
        let outcomes = parse_msearch_response(&raw, 2).expect("parse");
        assert!(matches!(outcomes[0], SearchOutcome::Hit(_)));
        assert_eq!(
            outcomes[1],
            SearchOutcome::Failed("index_not_found_exception".to_string())
        );
        assert!(matches!(
            parse_msearch_response(&raw, 3),
            Err(StoreError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn integration_http_store_posts_ndjson_to_msearch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/_msearch")
                .header("content-type", "application/x-ndjson")
                .header_exists("x-beacon-request-id")
                .body_includes("{\"index\":\"deployments\"}");
            then.status(200).json_body(json!({
                "responses": [{"aggregations": {"deployments": {"buckets": []}}}]
            }));
        });

        let store = HttpAnalyticsStore::new(config(server.base_url())).expect("store");
        let outcomes = store
            .multi_search(
                &[request("deployments", "deployments")],
                &CooperativeCancellationToken::new(),
            )
            .await
            .expect("multi search");

        mock.assert();
        assert_eq!(
            outcomes,
            vec![SearchOutcome::Hit(
                json!({"aggregations": {"deployments": {"buckets": []}}})
            )]
        );
    }

    #[tokio::test]
    async fn integration_http_store_retries_retryable_status_then_fails() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/_msearch");
            then.status(503).body("unavailable");
        });

        let store = HttpAnalyticsStore::new(config(server.base_url())).expect("store");
        let error = store
            .multi_search(&[request("q", "idx")], &CooperativeCancellationToken::new())
            .await
            .expect_err("should fail");

        mock.assert_calls(2);
        assert!(matches!(error, StoreError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn functional_cancelled_token_skips_transport() {
        let token = CooperativeCancellationToken::new();
        token.cancel();
        let store =
            HttpAnalyticsStore::new(config("http://127.0.0.1:9".to_string())).expect("store");
        let error = store
            .multi_search(&[request("q", "idx")], &token)
            .await
            .expect_err("cancelled");
        assert!(matches!(error, StoreError::Cancelled));
    }
}
