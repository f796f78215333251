//! Calendar math for reporting periods and histogram buckets.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Length of the reporting window selected by the `duration` binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodDuration {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl PeriodDuration {
    /// Parses `day`/`DAY`/`Day` style values.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "quarter" => Some(Self::Quarter),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    /// Moves `date` back by one period using calendar units.
    ///
    /// Month-based periods clamp to the last day of shorter months.
    pub fn step_back(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => date.checked_sub_days(Days::new(1)),
            Self::Week => date.checked_sub_days(Days::new(7)),
            Self::Month => date.checked_sub_months(Months::new(1)),
            Self::Quarter => date.checked_sub_months(Months::new(3)),
            Self::Year => date.checked_sub_months(Months::new(12)),
        }
    }

    /// First day of the window ending on `end_date`.
    pub fn window_start(self, end_date: NaiveDate) -> Option<NaiveDate> {
        self.step_back(end_date)?.checked_add_days(Days::new(1))
    }

    /// The window of the same calendar length immediately preceding
    /// `start_date`, as inclusive `(start, end)` dates.
    pub fn previous_window(self, start_date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let previous_end = start_date.checked_sub_days(Days::new(1))?;
        let previous_start = self.step_back(start_date)?;
        Some((previous_start, previous_end))
    }

    /// Histogram bucket width used for charts over this window.
    pub fn bucket_interval(self) -> BucketInterval {
        match self {
            Self::Day | Self::Week => BucketInterval::Day,
            Self::Month | Self::Quarter => BucketInterval::Week,
            Self::Year => BucketInterval::Month,
        }
    }
}

/// Width of one date-histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketInterval {
    Day,
    Week,
    Month,
}

impl BucketInterval {
    /// Calendar interval name understood by the analytics store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Start of the bucket containing `date` (weeks start on Monday).
    pub fn align_down(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => {
                let offset = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(offset)).unwrap_or(date)
            }
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Last day of the bucket starting at `bucket_start`.
    pub fn bucket_end(self, bucket_start: NaiveDate) -> NaiveDate {
        let next = match self {
            Self::Day => bucket_start.checked_add_days(Days::new(1)),
            Self::Week => bucket_start.checked_add_days(Days::new(7)),
            Self::Month => bucket_start.checked_add_months(Months::new(1)),
        };
        next.and_then(|value| value.checked_sub_days(Days::new(1)))
            .unwrap_or(bucket_start)
    }
}
