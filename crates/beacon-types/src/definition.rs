use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bindings::PlaceholderKind;
use crate::error::{WidgetError, WidgetResult};

/// Tag marking widgets scoped by application rather than component.
pub const APPLICATION_DASHBOARD_TAG: &str = "application-dashboard";

/// Runtime filters a widget opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeFilter {
    Tools,
    Severities,
    Sla,
}

/// One region of a widget, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Header,
    Section,
    Footer,
    Data,
}

impl RegionKind {
    pub const ALL: [Self; 4] = [Self::Header, Self::Section, Self::Footer, Self::Data];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Section => "section",
            Self::Footer => "footer",
            Self::Data => "data",
        }
    }
}

/// Drill-down target attached to a display element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillDown {
    pub report_id: String,
    pub report_title: String,
    pub report_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_info: Option<Value>,
}

impl DrillDown {
    pub fn new(
        report_id: impl Into<String>,
        report_title: impl Into<String>,
        report_type: impl Into<String>,
    ) -> Self {
        Self {
            report_id: report_id.into(),
            report_title: report_title.into(),
            report_type: report_type.into(),
            report_info: None,
        }
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.report_info = Some(info);
        self
    }
}

/// Where a region spec's payload comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecSource<'a> {
    PostProcessor { name: &'a str, spec_key: &'a str },
    Function { name: &'a str, spec_key: Option<&'a str> },
}

/// Display binding of one region entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSpec {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_process_function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_key: Option<String>,
}

impl RegionSpec {
    /// Resolves the producer of this spec.
    ///
    /// A post-processor takes precedence over a function declared on the same
    /// spec; the function's output is still present in the raw results.
    pub fn source(&self, widget_id: &str) -> WidgetResult<SpecSource<'_>> {
        let spec_key = self
            .spec_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        if let Some(name) = non_blank(self.post_process_function_name.as_deref()) {
            let Some(spec_key) = spec_key else {
                return Err(WidgetError::DefinitionInvalid {
                    widget_id: widget_id.to_string(),
                    reason: format!("post-processor '{name}' declared without a specKey"),
                });
            };
            return Ok(SpecSource::PostProcessor { name, spec_key });
        }
        if let Some(name) = non_blank(self.function_name.as_deref()) {
            return Ok(SpecSource::Function { name, spec_key });
        }
        Err(WidgetError::DefinitionInvalid {
            widget_id: widget_id.to_string(),
            reason: "region spec declares neither functionName nor postProcessFunctionName"
                .to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// One region and its specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDefinition {
    pub kind: RegionKind,
    #[serde(default)]
    pub specs: Vec<RegionSpec>,
}

/// Typed placeholder declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderDecl {
    pub name: String,
    pub kind: PlaceholderKind,
    #[serde(default)]
    pub required: bool,
}

/// A named query against one analytics store index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTemplate {
    pub alias: String,
    /// Query body; either raw text with `$name` placeholders or a JSON
    /// document whose string leaves may be placeholders.
    pub template: Value,
    /// Marks the commit-trends header family that filters by branch name.
    #[serde(default)]
    pub branch_name_filter: bool,
}

impl QueryTemplate {
    pub fn template_text(&self) -> String {
        match &self.template {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Immutable description of one widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDefinition {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub accepts: BTreeSet<RuntimeFilter>,
    #[serde(default)]
    pub placeholders: Vec<PlaceholderDecl>,
    #[serde(default)]
    pub regions: Vec<RegionDefinition>,
    #[serde(default)]
    pub queries: BTreeMap<String, QueryTemplate>,
    #[serde(default)]
    pub past_queries: BTreeMap<String, QueryTemplate>,
    #[serde(default)]
    pub functions: Vec<String>,
}

impl WidgetDefinition {
    pub fn is_application_dashboard(&self) -> bool {
        self.tags.contains(APPLICATION_DASHBOARD_TAG)
    }

    pub fn accepts(&self, filter: RuntimeFilter) -> bool {
        self.accepts.contains(&filter)
    }

    pub fn region(&self, kind: RegionKind) -> Option<&RegionDefinition> {
        self.regions.iter().find(|region| region.kind == kind)
    }

    /// Current and past query templates, past ones after current ones.
    pub fn all_queries(&self) -> impl Iterator<Item = (&String, &QueryTemplate)> {
        self.queries.iter().chain(self.past_queries.iter())
    }

    /// Checks structural rules that parsing alone cannot enforce: regions
    /// appear at most once and in header/section/footer/data order, and query
    /// names are unique across current and past templates.
    pub fn validate(&self) -> WidgetResult<()> {
        let mut last_kind: Option<RegionKind> = None;
        for region in &self.regions {
            if let Some(previous) = last_kind {
                if region.kind <= previous {
                    return Err(self.invalid(format!(
                        "region '{}' is duplicated or out of order",
                        region.kind.as_str()
                    )));
                }
            }
            last_kind = Some(region.kind);
        }
        for name in self.past_queries.keys() {
            if self.queries.contains_key(name) {
                return Err(self.invalid(format!(
                    "query '{name}' is declared as both current and past"
                )));
            }
        }
        for name in &self.functions {
            if self.queries.contains_key(name) || self.past_queries.contains_key(name) {
                return Err(self.invalid(format!(
                    "function '{name}' shadows a query of the same name"
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> WidgetError {
        WidgetError::DefinitionInvalid {
            widget_id: self.id.clone(),
            reason,
        }
    }
}

/// Widget definition for the component comparison view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonDefinition {
    #[serde(flatten)]
    pub widget: WidgetDefinition,
    pub post_process_function_name: String,
    #[serde(default = "default_comparison_spec_key")]
    pub spec_key: String,
}

fn default_comparison_spec_key() -> String {
    "tree".to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RegionKind, RegionSpec, SpecSource, WidgetDefinition};
    use crate::WidgetError;

    fn definition(value: serde_json::Value) -> WidgetDefinition {
        serde_json::from_value(value).expect("definition")
    }

    #[test]
    fn unit_region_spec_prefers_post_processor_over_function() {
        let spec = RegionSpec {
            function_name: Some("orgSummary".to_string()),
            post_process_function_name: Some("deployments".to_string()),
            spec_key: Some("header".to_string()),
            ..RegionSpec::default()
        };
        assert_eq!(
            spec.source("w").expect("source"),
            SpecSource::PostProcessor {
                name: "deployments",
                spec_key: "header"
            }
        );
    }

    #[test]
    fn unit_region_spec_without_source_is_invalid() {
        let error = RegionSpec::default().source("w").expect_err("no source");
        assert_eq!(error.code(), "definition_invalid");
        let error = RegionSpec {
            post_process_function_name: Some("deployments".to_string()),
            ..RegionSpec::default()
        }
        .source("w")
        .expect_err("no spec key");
        assert!(matches!(error, WidgetError::DefinitionInvalid { .. }));
    }

    #[test]
    fn functional_definition_parses_camel_case_catalogue_shape() {
        let parsed = definition(json!({
            "title": "Deployments",
            "tags": ["application-dashboard"],
            "accepts": ["sla"],
            "regions": [
                {"kind": "header", "specs": [{"postProcessFunctionName": "deployments", "specKey": "header"}]},
                {"kind": "section", "specs": [{"postProcessFunctionName": "deployments", "specKey": "chart", "chartType": "line"}]}
            ],
            "queries": {"deployments": {"alias": "deployments-idx", "template": {"size": 0}}},
            "pastQueries": {"deployments_past": {"alias": "deployments-idx", "template": "{\"size\":0}"}}
        }));
        assert!(parsed.is_application_dashboard());
        assert_eq!(parsed.regions[1].kind, RegionKind::Section);
        assert_eq!(
            parsed.regions[1].specs[0].chart_type.as_deref(),
            Some("line")
        );
        assert_eq!(parsed.queries["deployments"].template_text(), "{\"size\":0}");
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn regression_out_of_order_regions_fail_validation() {
        let parsed = definition(json!({
            "id": "w",
            "title": "Broken",
            "regions": [{"kind": "footer"}, {"kind": "header"}]
        }));
        let error = parsed.validate().expect_err("out of order");
        assert_eq!(error.code(), "definition_invalid");
    }
}
