use std::collections::BTreeMap;

use beacon_types::{Bindings, CategoryRow, RawResults, WidgetError, WidgetResult};
use serde_json::Value;

use super::{encode, raw_key, rows_with_percentages, trend_header};
use crate::aggregation::{aggregation, term_counts};
use crate::drilldown::report_drill_down;
use crate::numeric::canonical_label;
use crate::registry::PostProcessor;
use crate::series::{build_series, time_buckets};

const NAME: &str = "openFindings";
const QUERY: &str = "open_findings";
const PAST_QUERY: &str = "open_findings_past";

/// Severities reported by every severity family, most severe first.
/// `INFORMATION` findings are not reported.
pub const SEVERITY_ORDER: [&str; 4] = ["Very high", "High", "Medium", "Low"];

/// Open security findings split by severity.
pub struct OpenFindings;

/// Counts per reported severity, in [`SEVERITY_ORDER`].
fn severity_counts(payload: &Value) -> [i64; 4] {
    let mut by_label: BTreeMap<String, i64> = BTreeMap::new();
    for (raw, count) in term_counts(aggregation(payload, "severity")) {
        *by_label.entry(canonical_label(&raw)).or_insert(0) += count;
    }
    SEVERITY_ORDER.map(|label| by_label.get(label).copied().unwrap_or(0))
}

fn total(payload: &Value) -> i64 {
    severity_counts(payload).iter().sum()
}

impl PostProcessor for OpenFindings {
    fn name(&self) -> &'static str {
        NAME
    }

    fn process(&self, spec_key: &str, raw: &RawResults, bindings: &Bindings) -> WidgetResult<Value> {
        match spec_key {
            "header" => trend_header(total(raw.require(QUERY)?), raw, PAST_QUERY, total),
            "severity" => {
                let counts = severity_counts(raw.require(QUERY)?);
                let rows = SEVERITY_ORDER
                    .iter()
                    .zip(counts)
                    .map(|(title, value)| CategoryRow {
                        title: (*title).to_string(),
                        value,
                        percentage: None,
                        drill_down: Some(report_drill_down(
                            "open-findings",
                            "Open findings",
                            "finding",
                            bindings,
                            Some(("severity", raw_key(title).as_str())),
                        )),
                    })
                    .collect();
                Ok(encode(&rows_with_percentages(rows)))
            }
            "trend" => {
                let buckets = time_buckets(aggregation(raw.require(QUERY)?, "over_time"), "severity");
                Ok(encode(&build_series(&buckets, &SEVERITY_ORDER, bindings, Some("count"))))
            }
            other => Err(WidgetError::spec_key_unknown(NAME, other)),
        }
    }
}
