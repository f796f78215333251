use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use beacon_engine::{load_engine_config, EngineConfig};
use beacon_query::BaseFilters;
use beacon_types::Bindings;
use serde::de::DeserializeOwned;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Config file (if any) overlaid with the `BEACON_*` variables of `env`.
pub(crate) fn resolve_engine_config(
    path: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> Result<EngineConfig> {
    let base = match path {
        Some(path) => load_engine_config(path)?,
        None => EngineConfig::default(),
    };
    base.with_env_overrides(env)
        .context("failed to resolve engine config from environment")
}

fn read_json_or_default<T>(path: Option<&Path>, label: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {label} file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {label} file {}", path.display()))
}

pub(crate) fn read_bindings(path: Option<&Path>) -> Result<Bindings> {
    read_json_or_default(path, "bindings")
}

pub(crate) fn read_base_filters(path: Option<&Path>) -> Result<BaseFilters> {
    read_json_or_default(path, "base filters")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use beacon_types::{names, BindingValue};

    use super::{read_base_filters, read_bindings, resolve_engine_config};

    #[test]
    fn functional_bindings_file_accepts_strings_integers_and_lists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bindings.json");
        std::fs::write(
            &path,
            r#"{"endDate": "2024-03-31", "limit": 5, "component": ["c-1", "c-2"]}"#,
        )
        .expect("write");

        let bindings = read_bindings(Some(&path)).expect("bindings");
        assert_eq!(bindings.text(names::END_DATE), Some("2024-03-31"));
        assert_eq!(bindings.get("limit"), Some(&BindingValue::Integer(5)));
        assert_eq!(
            bindings.list(names::COMPONENT),
            Some(vec!["c-1".to_string(), "c-2".to_string()])
        );
    }

    #[test]
    fn unit_missing_files_default_to_empty() {
        assert!(read_bindings(None).expect("bindings").iter().next().is_none());
        assert!(read_base_filters(None).expect("filters").is_empty());
    }

    #[test]
    fn regression_malformed_bindings_name_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").expect("write");
        let error = read_bindings(Some(&path)).expect_err("malformed");
        assert!(format!("{error:#}").contains("broken.json"));
    }

    #[test]
    fn functional_env_overrides_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"storeUrl": "http://file", "batchSize": 8}"#).expect("write");
        let env = BTreeMap::from([(
            "BEACON_STORE_URL".to_string(),
            "http://env".to_string(),
        )]);

        let config = resolve_engine_config(Some(&path), &env).expect("config");
        assert_eq!(config.store_url, "http://env");
        assert_eq!(config.batch_size, 8);
    }
}
