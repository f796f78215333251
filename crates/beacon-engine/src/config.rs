use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use beacon_store::{ExecutorConfig, HttpServiceConfig};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const STORE_URL_ENV: &str = "BEACON_STORE_URL";
const STORE_TOKEN_ENV: &str = "BEACON_STORE_TOKEN";
const DIRECTORY_URL_ENV: &str = "BEACON_DIRECTORY_URL";
const AUTOMATIONS_URL_ENV: &str = "BEACON_AUTOMATIONS_URL";
const DEFINITIONS_DIR_ENV: &str = "BEACON_DEFINITIONS_DIR";
const REQUEST_TIMEOUT_ENV: &str = "BEACON_REQUEST_TIMEOUT_MS";
const CALL_TIMEOUT_ENV: &str = "BEACON_CALL_TIMEOUT_MS";
const MAX_RETRIES_ENV: &str = "BEACON_MAX_RETRIES";
const RETRY_BUDGET_ENV: &str = "BEACON_RETRY_BUDGET_MS";
const BATCH_SIZE_ENV: &str = "BEACON_MSEARCH_BATCH_SIZE";
const BRANCH_ID_ALIASES_ENV: &str = "BEACON_BRANCH_ID_ALIASES";
const ORG_CACHE_TTL_ENV: &str = "BEACON_ORG_CACHE_TTL_MS";
const AUTOMATION_CACHE_TTL_ENV: &str = "BEACON_AUTOMATION_CACHE_TTL_MS";
const TIME_ZONE_ENV: &str = "BEACON_TIME_ZONE";

/// Engine wiring: collaborator endpoints, deadlines and cache lifetimes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub store_url: String,
    pub store_token: Option<String>,
    pub directory_url: Option<String>,
    pub automations_url: Option<String>,
    pub definitions_dir: PathBuf,
    pub request_timeout_ms: u64,
    /// Deadline for one store batch or function call; zero disables it.
    pub call_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub batch_size: usize,
    /// Store aliases whose documents carry `branch_id`.
    pub branch_id_aliases: Vec<String>,
    pub org_cache_ttl_ms: u64,
    pub automation_cache_ttl_ms: u64,
    pub time_zone: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_url: "http://127.0.0.1:9200".to_string(),
            store_token: None,
            directory_url: None,
            automations_url: None,
            definitions_dir: PathBuf::from("definitions"),
            request_timeout_ms: 10_000,
            call_timeout_ms: 30_000,
            max_retries: 2,
            retry_budget_ms: 0,
            batch_size: 16,
            branch_id_aliases: Vec::new(),
            org_cache_ttl_ms: 300_000,
            automation_cache_ttl_ms: 300_000,
            time_zone: "UTC".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env_map(env: &BTreeMap<String, String>) -> Result<Self> {
        Self::default().with_env_overrides(env)
    }

    /// Applies `BEACON_*` overrides on top of `self`.
    pub fn with_env_overrides(mut self, env: &BTreeMap<String, String>) -> Result<Self> {
        if let Some(value) = non_empty(env, STORE_URL_ENV) {
            self.store_url = value.to_string();
        }
        if let Some(value) = non_empty(env, STORE_TOKEN_ENV) {
            self.store_token = Some(value.to_string());
        }
        if let Some(value) = non_empty(env, DIRECTORY_URL_ENV) {
            self.directory_url = Some(value.to_string());
        }
        if let Some(value) = non_empty(env, AUTOMATIONS_URL_ENV) {
            self.automations_url = Some(value.to_string());
        }
        if let Some(value) = non_empty(env, DEFINITIONS_DIR_ENV) {
            self.definitions_dir = PathBuf::from(value);
        }
        if let Some(value) = non_empty(env, BRANCH_ID_ALIASES_ENV) {
            self.branch_id_aliases = value
                .split(',')
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = non_empty(env, TIME_ZONE_ENV) {
            self.time_zone = value.to_string();
        }

        self.request_timeout_ms =
            parse_u64_env(env, REQUEST_TIMEOUT_ENV, self.request_timeout_ms)?;
        self.call_timeout_ms = parse_u64_env(env, CALL_TIMEOUT_ENV, self.call_timeout_ms)?;
        self.retry_budget_ms = parse_u64_env(env, RETRY_BUDGET_ENV, self.retry_budget_ms)?;
        self.org_cache_ttl_ms = parse_u64_env(env, ORG_CACHE_TTL_ENV, self.org_cache_ttl_ms)?;
        self.automation_cache_ttl_ms =
            parse_u64_env(env, AUTOMATION_CACHE_TTL_ENV, self.automation_cache_ttl_ms)?;
        self.max_retries = usize::try_from(parse_u64_env(
            env,
            MAX_RETRIES_ENV,
            self.max_retries as u64,
        )?)
        .with_context(|| format!("{MAX_RETRIES_ENV} is out of range"))?;
        self.batch_size = parse_positive_usize_env(env, BATCH_SIZE_ENV, self.batch_size)?;

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_url.trim().is_empty() {
            return Err(anyhow!("store url must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch size must be greater than 0"));
        }
        self.time_zone()?;
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| anyhow!("unknown time zone '{}'", self.time_zone))
    }

    pub fn http_config(&self, base_url: &str) -> HttpServiceConfig {
        HttpServiceConfig {
            base_url: base_url.to_string(),
            api_token: self.store_token.clone(),
            request_timeout_ms: self.request_timeout_ms,
            max_retries: self.max_retries,
            retry_budget_ms: self.retry_budget_ms,
            retry_jitter: true,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            batch_size: self.batch_size,
            call_timeout: self.call_timeout(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Reads an [`EngineConfig`] from a JSON file; absent fields take defaults.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read engine config {}", path.display()))?;
    let config: EngineConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse engine config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid engine config {}", path.display()))?;
    Ok(config)
}

fn non_empty<'a>(env: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_u64_env(env: &BTreeMap<String, String>, key: &str, default: u64) -> Result<u64> {
    let Some(raw) = non_empty(env, key) else {
        return Ok(default);
    };
    raw.parse::<u64>()
        .with_context(|| format!("{key} must be a non-negative integer"))
}

fn parse_positive_usize_env(
    env: &BTreeMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize> {
    let Some(raw) = non_empty(env, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<usize>()
        .with_context(|| format!("{key} must be a positive integer"))?;
    if value == 0 {
        return Err(anyhow!("{key} must be greater than 0"));
    }
    Ok(value)
}
