use std::collections::BTreeMap;

use beacon_types::{Bindings, CategoryRow, RawResults, WidgetError, WidgetResult};
use serde_json::Value;

use super::{encode, rows_with_percentages, trend_header};
use crate::aggregation::{aggregation, term_counts};
use crate::numeric::canonical_label;
use crate::registry::PostProcessor;
use crate::series::{build_series, time_buckets};

const NAME: &str = "workItems";
const QUERY: &str = "work_items";
const PAST_QUERY: &str = "work_items_past";
const WORK_ITEM_TYPES: [&str; 4] = ["Defect", "Feature", "Tech debt", "Vulnerability"];

/// Work items created, split by type.
pub struct WorkItems;

fn type_counts(payload: &Value) -> [i64; 4] {
    let mut by_label: BTreeMap<String, i64> = BTreeMap::new();
    for (raw, count) in term_counts(aggregation(payload, "type")) {
        *by_label.entry(canonical_label(&raw)).or_insert(0) += count;
    }
    WORK_ITEM_TYPES.map(|label| by_label.get(label).copied().unwrap_or(0))
}

fn total(payload: &Value) -> i64 {
    type_counts(payload).iter().sum()
}

impl PostProcessor for WorkItems {
    fn name(&self) -> &'static str {
        NAME
    }

    fn process(&self, spec_key: &str, raw: &RawResults, bindings: &Bindings) -> WidgetResult<Value> {
        match spec_key {
            "header" => trend_header(total(raw.require(QUERY)?), raw, PAST_QUERY, total),
            "chart" => {
                let buckets = time_buckets(aggregation(raw.require(QUERY)?, "over_time"), "type");
                Ok(encode(&build_series(&buckets, &WORK_ITEM_TYPES, bindings, Some("count"))))
            }
            "breakdown" => {
                let mut rows: Vec<CategoryRow> = WORK_ITEM_TYPES
                    .iter()
                    .zip(type_counts(raw.require(QUERY)?))
                    .map(|(title, value)| CategoryRow {
                        title: (*title).to_string(),
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
