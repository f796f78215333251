use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{WidgetError, WidgetResult};

/// Well-known binding names shared by the substitutor, filter composer and
/// post-processors.
pub mod names {
    pub const START_DATE: &str = "startDate";
    pub const END_DATE: &str = "endDate";
    pub const DURATION: &str = "duration";
    pub const PREVIOUS_START_DATE: &str = "p_startDate";
    pub const PREVIOUS_END_DATE: &str = "p_endDate";
    pub const HISTOGRAM_MIN: &str = "dateHistogramMin";
    pub const HISTOGRAM_MAX: &str = "dateHistogramMax";
    pub const HISTOGRAM_INTERVAL: &str = "dateHistogramInterval";
    pub const NORMALIZE_MONTH: &str = "normalizeMonthInSpec";
    pub const ORG_ID: &str = "orgId";
    pub const COMPONENT: &str = "component";
    pub const APPLICATION: &str = "application";
    pub const BRANCH: &str = "branch";
    pub const TOOLS: &str = "tools";
    pub const SEVERITIES: &str = "severities";
    pub const SLA: &str = "sla";
    pub const TIME_ZONE: &str = "timeZone";

    /// `normalizeMonthInSpec` value that disables the first-point override.
    pub const NORMALIZE_SENTINEL: &str = "@x";
    /// Scope value meaning "every application/component".
    pub const SCOPE_WILDCARD: &str = "All";
}

/// One binding value as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl BindingValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Text(_) => "string",
            Self::List(_) => "list",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Integer(_) | Self::List(_) => None,
        }
    }

    /// Renders the value as JSON text, the form used inside query bodies.
    pub fn to_json_text(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Text(value) => serde_json::Value::String(value.clone()).to_string(),
            Self::List(values) => serde_json::Value::Array(
                values
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            )
            .to_string(),
        }
    }

    /// Renders the value for interpolation inside an existing JSON string.
    pub fn to_inline_text(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::List(values) => values.join(","),
        }
    }
}

/// Declared type of a template placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    String,
    Integer,
    Date,
    List,
    Enum,
}

impl PlaceholderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::List => "list",
            Self::Enum => "enum",
        }
    }

    /// Checks that `value` is acceptable for a placeholder of this kind.
    pub fn check(self, name: &str, value: &BindingValue) -> WidgetResult<()> {
        let accepted = match (self, value) {
            (Self::String, BindingValue::Text(_)) => true,
            (Self::Integer, BindingValue::Integer(_)) => true,
            (Self::Integer, BindingValue::Text(raw)) => raw.trim().parse::<i64>().is_ok(),
            (Self::Date, BindingValue::Text(raw)) => parse_binding_date(raw).is_some(),
            (Self::List, BindingValue::List(_)) => true,
            (Self::Enum, BindingValue::Text(raw)) => is_enum_identifier(raw),
            _ => false,
        };
        if accepted {
            return Ok(());
        }
        Err(WidgetError::PlaceholderTypeMismatch {
            name: name.to_string(),
            expected: self.as_str(),
            actual: value.kind_name().to_string(),
        })
    }
}

fn is_enum_identifier(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

/// Parses an ISO-8601 date or date-time binding down to its calendar date.
pub fn parse_binding_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Name → value bindings for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings {
    values: BTreeMap<String, BindingValue>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used heavily by tests and callers.
    pub fn with(mut self, name: impl Into<String>, value: BindingValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: BindingValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BindingValue)> {
        self.values.iter()
    }

    /// Returns the trimmed text of a string binding, ignoring blanks.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(BindingValue::as_text)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Returns a list binding; a single string is treated as a one-item list.
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        match self.values.get(name)? {
            BindingValue::List(values) => Some(
                values
                    .iter()
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect(),
            ),
            BindingValue::Text(value) if !value.trim().is_empty() => {
                Some(vec![value.trim().to_string()])
            }
            BindingValue::Text(_) => Some(Vec::new()),
            BindingValue::Integer(value) => Some(vec![value.to_string()]),
        }
    }

    /// Parses a date binding; absent bindings yield `Ok(None)`.
    pub fn date(&self, name: &str) -> WidgetResult<Option<NaiveDate>> {
        let Some(value) = self.values.get(name) else {
            return Ok(None);
        };
        let parsed = value.as_text().and_then(parse_binding_date);
        match parsed {
            Some(date) => Ok(Some(date)),
            None => Err(WidgetError::PlaceholderTypeMismatch {
                name: name.to_string(),
                expected: PlaceholderKind::Date.as_str(),
                actual: value.kind_name().to_string(),
            }),
        }
    }
}

impl FromIterator<(String, BindingValue)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (String, BindingValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
