use beacon_types::{Bindings, RawResults, SubHeader, SubHeaderEntry, WidgetError, WidgetResult};
use serde_json::Value;

use super::{encode, raw_key, trend_header};
use crate::aggregation::aggregation;
use crate::drilldown::report_drill_down;
use crate::registry::PostProcessor;
use crate::series::{build_series, time_buckets, TimeBucket};

const NAME: &str = "deployments";
const QUERY: &str = "deployments";
const PAST_QUERY: &str = "deployments_past";
const HISTOGRAM: &str = "deployments";
const SPLIT_BY: &str = "status";
const SERIES: [&str; 2] = ["Success", "Failure"];

/// Deployment outcomes over time.
pub struct Deployments;

fn read_buckets(payload: &Value) -> Vec<TimeBucket> {
    time_buckets(aggregation(payload, HISTOGRAM), SPLIT_BY)
}

fn totals(buckets: &[TimeBucket]) -> [i64; 2] {
    let mut totals = [0_i64; 2];
    for bucket in buckets {
        for (slot, id) in totals.iter_mut().zip(SERIES) {
            *slot += bucket.values.get(id).copied().unwrap_or(0);
        }
    }
    totals
}

impl PostProcessor for Deployments {
    fn name(&self) -> &'static str {
        NAME
    }

    fn process(&self, spec_key: &str, raw: &RawResults, bindings: &Bindings) -> WidgetResult<Value> {
        match spec_key {
            "header" => {
                let current = totals(&read_buckets(raw.require(QUERY)?)).iter().sum();
                trend_header(current, raw, PAST_QUERY, |past| {
                    totals(&read_buckets(past)).iter().sum()
                })
            }
            "subHeader" => {
                let totals = totals(&read_buckets(raw.require(QUERY)?));
                let entries = SERIES
                    .iter()
                    .zip(totals)
                    .map(|(title, value)| SubHeaderEntry {
                        title: (*title).to_string(),
                        value: Value::from(value),
                        drill_down: Some(report_drill_down(
                            "deployments",
                            "Deployments",
                            "deployment",
                            bindings,
                            Some((SPLIT_BY, raw_key(title).as_str())),
                        )),
                    })
                    .collect();
                Ok(encode(&SubHeader {
                    sub_header: entries,
                }))
            }
            "chart" => {
                let buckets = read_buckets(raw.require(QUERY)?);
                Ok(encode(&build_series(&buckets, &SERIES, bindings, Some("count"))))
            }
            other => Err(WidgetError::spec_key_unknown(NAME, other)),
        }
    }
}
