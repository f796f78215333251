//! Response shapes emitted to the dashboard front-end.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{DrillDown, RegionKind, RegionSpec};

/// Header payload: `{value, subtitle?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderValue {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

impl HeaderValue {
    pub fn count(value: i64) -> Self {
        Self {
            value: Value::from(value),
            subtitle: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

/// One `subHeader` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubHeaderEntry {
    pub title: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drill_down: Option<DrillDown>,
}

/// Sub-header payload: `{subHeader: [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubHeader {
    #[serde(rename = "subHeader")]
    pub sub_header: Vec<SubHeaderEntry>,
}

/// Categorical chart/table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub title: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drill_down: Option<DrillDown>,
}

/// Inclusive date span covered by one time-series point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointDate {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: String,
    pub y: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<PointDate>,
}

/// One named time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: String,
    pub data: Vec<SeriesPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_formatter: Option<String>,
}

/// A region spec after resolution: display attributes from the definition
/// plus the produced payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drill_down: Option<DrillDown>,
    pub data: Value,
}

impl ResolvedSpec {
    /// Carries the display attributes of `spec` over unchanged.
    pub fn from_spec(spec: &RegionSpec, data: Value) -> Self {
        Self {
            title: spec.title.clone(),
            description: spec.description.clone(),
            chart_type: spec.chart_type.clone(),
            color_scheme: spec.color_scheme.clone(),
            drill_down: spec.drill_down.clone(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOutput {
    pub kind: RegionKind,
    pub specs: Vec<ResolvedSpec>,
}

/// Assembled widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetOutput {
    pub id: String,
    pub title: String,
    pub description: String,
    pub regions: Vec<RegionOutput>,
}

/// One positional entry of a comparison node's metric breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub title: String,
    pub value: i64,
    pub value_in_millis: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSection {
    pub data: Vec<SectionEntry>,
}

/// One node of the component comparison tree.
///
/// Zero values are always serialized; consumers distinguish missing from zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonNode {
    pub is_sub_org: bool,
    pub id: String,
    pub title: String,
    pub sub_org_count: u64,
    pub component_count: u64,
    pub total_value: i64,
    pub value_in_millis: i64,
    pub children: Vec<ComparisonNode>,
    pub section: ComparisonSection,
}

/// Assembled component comparison view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutput {
    pub id: String,
    pub title: String,
    pub description: String,
    pub regions: Vec<RegionOutput>,
    pub total_value: i64,
    pub value_in_millis: i64,
    pub nodes: Vec<ComparisonNode>,
}
