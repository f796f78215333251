use beacon_types::{
    names, BindingValue, Bindings, BucketInterval, PeriodDuration, WidgetError, WidgetResult,
};
use chrono::{Days, NaiveDate};

const DAY_BUCKET_MAX_SPAN_DAYS: i64 = 14;
const WEEK_BUCKET_MAX_SPAN_DAYS: i64 = 120;

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns `bindings` plus the period and histogram bindings it implies.
///
/// Caller-provided values are never overwritten. With `endDate` and
/// `duration` the window start is derived; the previous period is the
/// window of the same calendar length ending the day before `startDate`.
/// The histogram window is widened to whole buckets.
pub fn derive_bindings(bindings: &Bindings) -> WidgetResult<Bindings> {
    let mut derived = bindings.clone();

    let duration = match bindings.text(names::DURATION) {
        Some(raw) => Some(PeriodDuration::parse(raw).ok_or_else(|| {
            WidgetError::PlaceholderTypeMismatch {
                name: names::DURATION.to_string(),
                expected: "day|week|month|quarter|year",
                actual: raw.to_string(),
            }
        })?),
        None => None,
    };
    let end = bindings.date(names::END_DATE)?;
    let mut start = bindings.date(names::START_DATE)?;

    if start.is_none() {
        if let (Some(end), Some(duration)) = (end, duration) {
            start = duration.window_start(end);
            if let Some(start) = start {
                insert_absent(&mut derived, names::START_DATE, format_date(start));
            }
        }
    }

    if let Some(start) = start {
        let previous = match (duration, end) {
            (Some(duration), _) => duration.previous_window(start),
            (None, Some(end)) => same_length_window_before(start, end),
            (None, None) => None,
        };
        if let Some((previous_start, previous_end)) = previous {
            insert_absent(&mut derived, names::PREVIOUS_START_DATE, format_date(previous_start));
            insert_absent(&mut derived, names::PREVIOUS_END_DATE, format_date(previous_end));
        }
    }

    if let (Some(start), Some(end)) = (start, end) {
        let interval = histogram_interval(bindings, duration, start, end);
        let first_bucket = interval.align_down(start);
        let last_bucket_end = interval.bucket_end(interval.align_down(end));
        insert_absent(&mut derived, names::HISTOGRAM_INTERVAL, interval.as_str().to_string());
        insert_absent(&mut derived, names::HISTOGRAM_MIN, format_date(first_bucket));
        insert_absent(&mut derived, names::HISTOGRAM_MAX, format_date(last_bucket_end));
    }

    tracing::debug!(
        duration = duration.map(PeriodDuration::as_str),
        derived = derived.iter().count() - bindings.iter().count(),
        "derived period bindings"
    );
    Ok(derived)
}

fn insert_absent(bindings: &mut Bindings, name: &str, value: String) {
    if !bindings.contains(name) {
        bindings.insert(name, BindingValue::Text(value));
    }
}

fn same_length_window_before(start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let span_days = u64::try_from((end - start).num_days()).ok()?;
    let previous_end = start.checked_sub_days(Days::new(1))?;
    let previous_start = previous_end.checked_sub_days(Days::new(span_days))?;
    Some((previous_start, previous_end))
}

fn histogram_interval(
    bindings: &Bindings,
    duration: Option<PeriodDuration>,
    start: NaiveDate,
    end: NaiveDate,
) -> BucketInterval {
    let explicit = bindings
        .text(names::HISTOGRAM_INTERVAL)
        .and_then(|raw| match raw.to_ascii_lowercase().as_str() {
            "day" => Some(BucketInterval::Day),
            "week" => Some(BucketInterval::Week),
            "month" => Some(BucketInterval::Month),
            _ => None,
        });
    if let Some(interval) = explicit {
        return interval;
    }
    if let Some(duration) = duration {
        return duration.bucket_interval();
    }
    match (end - start).num_days() {
        span if span <= DAY_BUCKET_MAX_SPAN_DAYS => BucketInterval::Day,
        span if span <= WEEK_BUCKET_MAX_SPAN_DAYS => BucketInterval::Week,
        _ => BucketInterval::Month,
    }
}
