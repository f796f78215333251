use beacon_types::{
    Bindings, CategoryRow, RawResults, SubHeader, SubHeaderEntry, WidgetError, WidgetResult,
};
use serde_json::Value;

use super::{encode, rows_with_percentages, trend_header};
use crate::aggregation::{metric_i64, path};
use crate::drilldown::report_drill_down;
use crate::numeric::canonical_label;
use crate::registry::PostProcessor;

const NAME: &str = "automationRuns";
const QUERY: &str = "automation_run";
const PAST_QUERY: &str = "automation_run_past";

/// Automation run outcomes from a scripted metric returning
/// `value.data = [{"Success": n}, {"Failure": m}, ...]`.
pub struct AutomationRuns;

/// `(raw status, display label, count)` in first-appearance order; repeated
/// statuses are summed into the first entry.
fn outcomes(payload: &Value) -> Vec<(String, String, i64)> {
    let data = path(payload, &["aggregations", "automation_run", "value", "data"])
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut outcomes: Vec<(String, String, i64)> = Vec::new();
    for entry in data.iter().filter_map(Value::as_object) {
        for (status, count) in entry {
            let label = canonical_label(status);
            let count = metric_i64(Some(count));
            match outcomes.iter_mut().find(|(_, existing, _)| *existing == label) {
                Some((_, _, total)) => *total += count,
                None => outcomes.push((status.clone(), label, count)),
            }
        }
    }
    outcomes
}

fn total(payload: &Value) -> i64 {
    outcomes(payload).iter().map(|(_, _, count)| count).sum()
}

impl PostProcessor for AutomationRuns {
    fn name(&self) -> &'static str {
        NAME
    }

    fn process(&self, spec_key: &str, raw: &RawResults, bindings: &Bindings) -> WidgetResult<Value> {
        match spec_key {
            "header" => trend_header(total(raw.require(QUERY)?), raw, PAST_QUERY, total),
            "subHeader" => {
                let entries = outcomes(raw.require(QUERY)?)
                    .into_iter()
                    .map(|(status, title, count)| SubHeaderEntry {
                        drill_down: Some(report_drill_down(
                            "automation-runs",
                            "Automation runs",
                            "automationRun",
                            bindings,
                            Some(("status", status.as_str())),
                        )),
                        title,
                        value: Value::from(count),
                    })
                    .collect();
                Ok(encode(&SubHeader {
                    sub_header: entries,
                }))
            }
            "chart" => {
                let mut rows: Vec<CategoryRow> = outcomes(raw.require(QUERY)?)
                    .into_iter()
                    .map(|(_, title, value)| CategoryRow {
                        title,
                        value,
                        percentage: None,
                        drill_down: None,
                    })
                    .collect();
                rows.sort_by(|left, right| left.title.cmp(&right.title));
                Ok(encode(&rows_with_percentages(rows)))
            }
            other => Err(WidgetError::spec_key_unknown(NAME, other)),
        }
    }
}
