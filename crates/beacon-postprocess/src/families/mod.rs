//! Built-in widget families. Each family fixes its query keys, spec keys and
//! the set and order of its categories.

mod automation_runs;
mod cwe_top25;
mod deployments;
mod mttr;
mod open_findings;
mod work_items;

pub use automation_runs::AutomationRuns;
pub use cwe_top25::CweTop25;
pub use deployments::Deployments;
pub use mttr::Mttr;
pub use open_findings::{OpenFindings, SEVERITY_ORDER};
pub use work_items::WorkItems;

use beacon_types::{CategoryRow, HeaderValue, RawResults, WidgetResult};
use serde::Serialize;
use serde_json::Value;

use crate::numeric::{percentages, trend_subtitle};

/// Encodes an output shape. Output types only hold string-keyed maps, so
/// encoding does not fail.
pub(crate) fn encode<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// Header with a trend subtitle when the past-period query is present.
pub(crate) fn trend_header<F>(
    current: i64,
    raw: &RawResults,
    past_key: &str,
    read_past: F,
) -> WidgetResult<Value>
where
    F: Fn(&Value) -> i64,
{
    let mut header = HeaderValue::count(current);
    if let Some(past) = raw.optional(past_key)? {
        header.subtitle = trend_subtitle(current as f64, read_past(past) as f64);
    }
    Ok(encode(&header))
}

/// Rows with two-decimal shares of the row total.
pub(crate) fn rows_with_percentages(rows: Vec<CategoryRow>) -> Vec<CategoryRow> {
    let values: Vec<i64> = rows.iter().map(|row| row.value).collect();
    rows.into_iter()
        .zip(percentages(&values))
        .map(|(row, percentage)| CategoryRow {
            percentage: Some(percentage),
            ..row
        })
        .collect()
}

/// Raw enum form of a display label: `Very high` becomes `VERY_HIGH`.
pub(crate) fn raw_key(label: &str) -> String {
    label.to_uppercase().replace(' ', "_")
}
