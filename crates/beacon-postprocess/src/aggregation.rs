//! Sparse-tolerant readers over analytics store aggregation payloads.
//!
//! Every accessor treats a missing or mistyped nested field as zero or empty.

use std::collections::BTreeMap;

use serde_json::Value;

/// Follows `path` through nested objects.
pub fn path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// `aggregations.<name>` of a search response.
pub fn aggregation<'a>(payload: &'a Value, name: &str) -> Option<&'a Value> {
    path(payload, &["aggregations", name])
}

/// The `buckets` array under `value`, or an empty slice.
pub fn buckets(value: Option<&Value>) -> &[Value] {
    value
        .and_then(|value| value.get("buckets"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// A numeric metric given as a bare number, `{value}` or `{doc_count}`.
pub fn metric_f64(value: Option<&Value>) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    if let Some(number) = value.as_f64() {
        return number;
    }
    value
        .get("value")
        .or_else(|| value.get("doc_count"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Integer form of [`metric_f64`]; counts arrive as integral doubles.
pub fn metric_i64(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(number)) if number.is_i64() => number.as_i64().unwrap_or(0),
        other => crate::numeric::round_half_up(metric_f64(other)),
    }
}

pub fn doc_count(bucket: &Value) -> i64 {
    metric_i64(bucket.get("doc_count"))
}

/// Bucket key, preferring `key_as_string` over `key`.
pub fn bucket_key(bucket: &Value) -> Option<String> {
    let key = bucket.get("key_as_string").or_else(|| bucket.get("key"))?;
    match key {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// `{key → doc_count}` of a terms sub-aggregation, summing repeated keys.
pub fn term_counts(value: Option<&Value>) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for bucket in buckets(value) {
        if let Some(key) = bucket_key(bucket) {
            *counts.entry(key).or_insert(0) += doc_count(bucket);
        }
    }
    counts
}

/// Per-component entries of a comparison aggregation.
///
/// Accepts either terms buckets keyed by component id or a scripted metric
/// whose `value` is an object keyed by component id.
pub fn keyed_entries<'a>(aggregation: Option<&'a Value>) -> BTreeMap<String, &'a Value> {
    let mut entries = BTreeMap::new();
    let Some(aggregation) = aggregation else {
        return entries;
    };
    if let Some(map) = aggregation.get("value").and_then(Value::as_object) {
        for (key, entry) in map {
            entries.insert(key.clone(), entry);
        }
        return entries;
    }
    for bucket in buckets(Some(aggregation)) {
        if let Some(key) = bucket_key(bucket) {
            entries.entry(key).or_insert(bucket);
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{aggregation, bucket_key, buckets, keyed_entries, metric_i64, term_counts};

    #[test]
    fn unit_missing_fields_read_as_zero_or_empty() {
        let payload = json!({"aggregations": {}});
        assert!(buckets(aggregation(&payload, "deployments")).is_empty());
        assert_eq!(metric_i64(None), 0);
        assert_eq!(metric_i64(Some(&json!({"value": null}))), 0);
        assert_eq!(metric_i64(Some(&json!("n/a"))), 0);
    }

    #[test]
    fn unit_metrics_accept_numbers_value_and_doc_count() {
        assert_eq!(metric_i64(Some(&json!(7))), 7);
        assert_eq!(metric_i64(Some(&json!({"value": 2.5}))), 3);
        assert_eq!(metric_i64(Some(&json!({"doc_count": 4}))), 4);
        let bucket = json!({"key": 1709251200000_i64, "key_as_string": "2024-03-01"});
        assert_eq!(bucket_key(&bucket).as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn functional_term_counts_sum_duplicate_keys() {
        let counts = term_counts(Some(&json!({"buckets": [
            {"key": "HIGH", "doc_count": 2},
            {"key": "HIGH", "doc_count": 3},
            {"key": "LOW"}
        ]})));
        assert_eq!(counts["HIGH"], 5);
        assert_eq!(counts["LOW"], 0);
    }

    #[test]
    fn functional_keyed_entries_accept_buckets_and_maps() {
        let buckets = json!({"buckets": [{"key": "c1", "doc_count": 1}]});
        let from_buckets = keyed_entries(Some(&buckets));
        assert!(from_buckets.contains_key("c1"));
        let map = json!({"value": {"c2": {"DEFECT_COUNT": 1}}});
        let from_map = keyed_entries(Some(&map));
        assert_eq!(from_map["c2"], &json!({"DEFECT_COUNT": 1}));
    }
}
