//! Time-series shaping shared by every histogram-backed family.

use std::collections::BTreeMap;

use beacon_types::bindings::parse_binding_date;
use beacon_types::{names, Bindings, BucketInterval, PeriodDuration, PointDate, Series, SeriesPoint};
use chrono::NaiveDate;
use serde_json::Value;

use crate::aggregation::{bucket_key, buckets, term_counts};
use crate::numeric::canonical_label;

/// One histogram bucket with its per-series values keyed by display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucket {
    pub key: String,
    pub values: BTreeMap<String, i64>,
}

/// Reads a date histogram whose buckets split by a terms sub-aggregation.
///
/// Sub-bucket keys are canonicalized and duplicate labels summed.
pub fn time_buckets(histogram: Option<&Value>, split_by: &str) -> Vec<TimeBucket> {
    buckets(histogram)
        .iter()
        .filter_map(|bucket| {
            let key = bucket_key(bucket)?;
            let mut values = BTreeMap::new();
            for (raw, count) in term_counts(bucket.get(split_by)) {
                *values.entry(canonical_label(&raw)).or_insert(0) += count;
            }
            Some(TimeBucket { key, values })
        })
        .collect()
}

/// Bucket width for the request: explicit interval binding, then duration.
pub fn bucket_interval(bindings: &Bindings) -> BucketInterval {
    let explicit = bindings
        .text(names::HISTOGRAM_INTERVAL)
        .and_then(|raw| match raw.to_ascii_lowercase().as_str() {
            "day" => Some(BucketInterval::Day),
            "week" => Some(BucketInterval::Week),
            "month" => Some(BucketInterval::Month),
            _ => None,
        });
    explicit
        .or_else(|| {
            bindings
                .text(names::DURATION)
                .and_then(PeriodDuration::parse)
                .map(PeriodDuration::bucket_interval)
        })
        .unwrap_or(BucketInterval::Day)
}

fn normalized_first_start(bindings: &Bindings) -> Option<NaiveDate> {
    bindings
        .text(names::NORMALIZE_MONTH)
        .filter(|raw| *raw != names::NORMALIZE_SENTINEL)
        .and_then(parse_binding_date)
}

fn format_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Builds one series per id, each with one point per bucket in bucket order.
///
/// Missing values read as zero. Each point covers `[key, key + bucket - 1d]`;
/// the first point starts at `normalizeMonthInSpec` instead, unless that
/// binding is the `@x` sentinel, and then ends with its calendar bucket.
pub fn build_series(
    time_buckets: &[TimeBucket],
    ids: &[&str],
    bindings: &Bindings,
    y_axis_formatter: Option<&str>,
) -> Vec<Series> {
    let interval = bucket_interval(bindings);
    let first_start = normalized_first_start(bindings);

    let dates: Vec<Option<PointDate>> = time_buckets
        .iter()
        .enumerate()
        .map(|(index, bucket)| {
            if index == 0 {
                if let Some(start) = first_start {
                    return Some(PointDate {
                        start_date: format_day(start),
                        end_date: format_day(interval.bucket_end(interval.align_down(start))),
                    });
                }
            }
            let start = parse_binding_date(&bucket.key)?;
            Some(PointDate {
                start_date: format_day(start),
                end_date: format_day(interval.bucket_end(start)),
            })
        })
        .collect();

    ids.iter()
        .map(|id| Series {
            id: (*id).to_string(),
            data: time_buckets
                .iter()
                .zip(&dates)
                .map(|(bucket, date)| SeriesPoint {
                    x: bucket.key.clone(),
                    y: bucket.values.get(*id).copied().unwrap_or(0),
                    date: date.clone(),
                })
                .collect(),
            y_axis_formatter: y_axis_formatter.map(str::to_string),
        })
        .collect()
}
