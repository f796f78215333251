use beacon_types::{Bindings, CategoryRow, HeaderValue, RawResults, WidgetError, WidgetResult};
use serde_json::Value;

use super::encode;
use crate::aggregation::{aggregation, bucket_key, buckets, metric_i64};
use crate::drilldown::report_drill_down;
use crate::registry::PostProcessor;

const NAME: &str = "cweTop25";
const QUERY: &str = "cwe_top25";
const TOP_N: usize = 25;

/// Most frequent CWE weaknesses.
///
/// Entries arrive ranked by the server, either as a scripted metric list
/// `value = [{cweId, issuesFound}]` or as terms buckets carrying an
/// `issuesFound` metric.
pub struct CweTop25;

fn ranked(payload: &Value) -> Vec<(String, i64)> {
    let agg = aggregation(payload, QUERY);
    let listed = agg
        .and_then(|agg| agg.get("value"))
        .and_then(Value::as_array);
    let entries: Vec<(String, i64)> = match listed {
        Some(list) => list
            .iter()
            .filter_map(|entry| {
                let id = entry.get("cweId").and_then(Value::as_str)?;
                Some((id.to_string(), metric_i64(entry.get("issuesFound"))))
            })
            .collect(),
        None => buckets(agg)
            .iter()
            .filter_map(|bucket| {
                let id = bucket_key(bucket)?;
                let found = bucket
                    .get("issuesFound")
                    .or_else(|| bucket.get("doc_count"));
                Some((id, metric_i64(found)))
            })
            .collect(),
    };

    let mut merged: Vec<(String, i64)> = Vec::new();
    for (id, found) in entries {
        match merged.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, total)) => *total += found,
            None => merged.push((id, found)),
        }
    }
    merged.retain(|(_, found)| *found > 0);
    merged.truncate(TOP_N);
    merged
}

impl PostProcessor for CweTop25 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn process(&self, spec_key: &str, raw: &RawResults, bindings: &Bindings) -> WidgetResult<Value> {
        match spec_key {
            "header" => {
                let total = ranked(raw.require(QUERY)?).iter().map(|(_, found)| found).sum();
                Ok(encode(&HeaderValue::count(total)))
            }
            "table" => {
                let rows: Vec<CategoryRow> = ranked(raw.require(QUERY)?)
                    .into_iter()
                    .map(|(id, found)| CategoryRow {
                        drill_down: Some(report_drill_down(
                            "cwe-findings",
                            "CWE findings",
                            "finding",
                            bindings,
                            Some(("cwe", id.as_str())),
                        )),
                        title: id,
                        value: found,
                        percentage: None,
                    })
                    .collect();
                Ok(encode(&rows))
            }
            other => Err(WidgetError::spec_key_unknown(NAME, other)),
        }
    }
}
