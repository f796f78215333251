use std::collections::BTreeMap;

use beacon_types::{Bindings, CategoryRow, HeaderValue, RawResults, WidgetError, WidgetResult};
use serde_json::Value;

use super::{encode, SEVERITY_ORDER};
use crate::aggregation::{aggregation, bucket_key, buckets, doc_count, metric_f64, metric_i64};
use crate::numeric::{average_millis, canonical_label, trend_subtitle};
use crate::registry::PostProcessor;

const NAME: &str = "mttr";
const QUERY: &str = "mttr";
const PAST_QUERY: &str = "mttr_past";

/// Mean time to resolve findings, in milliseconds.
///
/// Reads `resolution_time` (sum of resolution durations) and `resolved`
/// (count) at the top level and per `severity` bucket.
pub struct Mttr;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct DurationTotals {
    duration_sum: f64,
    count: i64,
}

impl DurationTotals {
    fn add(&mut self, other: DurationTotals) {
        self.duration_sum += other.duration_sum;
        self.count += other.count;
    }

    fn average_millis(self) -> i64 {
        average_millis(self.duration_sum, self.count)
    }
}

fn overall(payload: &Value) -> DurationTotals {
    DurationTotals {
        duration_sum: metric_f64(aggregation(payload, "resolution_time")),
        count: metric_i64(aggregation(payload, "resolved")),
    }
}

fn by_severity(payload: &Value) -> [DurationTotals; 4] {
    let mut by_label: BTreeMap<String, DurationTotals> = BTreeMap::new();
    for bucket in buckets(aggregation(payload, "severity")) {
        let Some(key) = bucket_key(bucket) else {
            continue;
        };
        by_label
            .entry(canonical_label(&key))
            .or_default()
            .add(DurationTotals {
                duration_sum: metric_f64(bucket.get("resolution_time")),
                count: doc_count(bucket),
            });
    }
    SEVERITY_ORDER.map(|label| by_label.get(label).copied().unwrap_or_default())
}

impl PostProcessor for Mttr {
    fn name(&self) -> &'static str {
        NAME
    }

    fn process(&self, spec_key: &str, raw: &RawResults, _bindings: &Bindings) -> WidgetResult<Value> {
        match spec_key {
            "header" => {
                let current = overall(raw.require(QUERY)?).average_millis();
                let mut header = HeaderValue::count(current);
                if let Some(past) = raw.optional(PAST_QUERY)? {
                    header.subtitle =
                        trend_subtitle(current as f64, overall(past).average_millis() as f64);
                }
                Ok(encode(&header))
            }
            "bySeverity" => {
                let rows: Vec<CategoryRow> = SEVERITY_ORDER
                    .iter()
                    .zip(by_severity(raw.require(QUERY)?))
                    .map(|(title, totals)| CategoryRow {
                        title: (*title).to_string(),
                        value: totals.average_millis(),
                        percentage: None,
                        drill_down: None,
                    })
                    .collect();
                Ok(encode(&rows))
            }
            other => Err(WidgetError::spec_key_unknown(NAME, other)),
        }
    }
}
