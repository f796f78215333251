use std::collections::BTreeMap;

use beacon_types::{
    Bindings, ComparisonNode, OrganizationNode, RawResults, WidgetError, WidgetResult,
};
use serde_json::Value;

use super::{assemble, CategoryMetric, ComparisonLayout, ComponentMetrics, MetricKind};
use crate::aggregation::{aggregation, keyed_entries, metric_f64, metric_i64, term_counts};
use crate::families::SEVERITY_ORDER;
use crate::numeric::canonical_label;
use crate::registry::ComparisonProcessor;

const TREE_SPEC_KEY: &str = "tree";
const COMPONENTS_AGGREGATION: &str = "components";

/// Reads the per-component entries of `query` and assembles the tree.
fn build<F>(
    processor: &str,
    spec_key: &str,
    raw: &RawResults,
    tree: &OrganizationNode,
    query: &str,
    layout: &ComparisonLayout,
    read: F,
) -> WidgetResult<ComparisonNode>
where
    F: Fn(&Value) -> ComponentMetrics,
{
    if spec_key != TREE_SPEC_KEY {
        return Err(WidgetError::spec_key_unknown(processor, spec_key));
    }
    let payload = raw.require(query)?;
    let metrics: BTreeMap<String, ComponentMetrics> =
        keyed_entries(aggregation(payload, COMPONENTS_AGGREGATION))
            .into_iter()
            .map(|(component_id, entry)| (component_id, read(entry)))
            .collect();
    tracing::debug!(processor, components = metrics.len(), "assembling comparison tree");
    Ok(assemble(tree, &metrics, layout))
}

fn from_categories(categories: Vec<CategoryMetric>) -> ComponentMetrics {
    ComponentMetrics {
        total: categories.iter().map(|category| category.count).sum(),
        duration_sum: categories.iter().map(|category| category.duration_sum).sum(),
        categories,
    }
}

const CYCLE_TIME_LAYOUT: ComparisonLayout = ComparisonLayout {
    titles: &["Defect", "Feature", "Tech debt"],
    kind: MetricKind::Duration,
    absent_category: None,
};
const CYCLE_TIME_PREFIXES: [&str; 3] = ["DEFECT", "FEATURE", "TECH_DEBT"];

/// Cycle time per work item type, from `<TYPE>_TIME` duration sums and
/// `<TYPE>_COUNT` counts per component.
pub struct ComponentCycleTime;

impl ComparisonProcessor for ComponentCycleTime {
    fn name(&self) -> &'static str {
        "componentCycleTime"
    }

    fn process(
        &self,
        spec_key: &str,
        raw: &RawResults,
        _bindings: &Bindings,
        tree: &OrganizationNode,
    ) -> WidgetResult<ComparisonNode> {
        build(
            self.name(),
            spec_key,
            raw,
            tree,
            "cycle_time",
            &CYCLE_TIME_LAYOUT,
            |entry| {
                from_categories(
                    CYCLE_TIME_PREFIXES
                        .iter()
                        .map(|prefix| CategoryMetric {
                            count: metric_i64(entry.get(format!("{prefix}_COUNT").as_str())),
                            duration_sum: metric_f64(entry.get(format!("{prefix}_TIME").as_str())),
                        })
                        .collect(),
                )
            },
        )
    }
}

const FINDINGS_LAYOUT: ComparisonLayout = ComparisonLayout {
    titles: &SEVERITY_ORDER,
    kind: MetricKind::Count,
    absent_category: None,
};

/// Open findings per severity and component.
pub struct ComponentFindings;

impl ComparisonProcessor for ComponentFindings {
    fn name(&self) -> &'static str {
        "componentFindings"
    }

    fn process(
        &self,
        spec_key: &str,
        raw: &RawResults,
        _bindings: &Bindings,
        tree: &OrganizationNode,
    ) -> WidgetResult<ComparisonNode> {
        build(
            self.name(),
            spec_key,
            raw,
            tree,
            "component_findings",
            &FINDINGS_LAYOUT,
            |entry| {
                let mut by_label: BTreeMap<String, i64> = BTreeMap::new();
                for (raw_severity, count) in term_counts(entry.get("severity")) {
                    *by_label.entry(canonical_label(&raw_severity)).or_insert(0) += count;
                }
                from_categories(
                    SEVERITY_ORDER
                        .iter()
                        .map(|label| CategoryMetric {
                            count: by_label.get(*label).copied().unwrap_or(0),
                            duration_sum: 0.0,
                        })
                        .collect(),
                )
            },
        )
    }
}

const ACTIVITY_LAYOUT: ComparisonLayout = ComparisonLayout {
    titles: &["Active", "Inactive"],
    kind: MetricKind::Count,
    absent_category: Some(1),
};

/// Active versus inactive components. A component is active when it has at
/// least one event in the window; `total_value` counts events.
pub struct ComponentActivity;

impl ComparisonProcessor for ComponentActivity {
    fn name(&self) -> &'static str {
        "componentActivity"
    }

    fn process(
        &self,
        spec_key: &str,
        raw: &RawResults,
        _bindings: &Bindings,
        tree: &OrganizationNode,
    ) -> WidgetResult<ComparisonNode> {
        build(
            self.name(),
            spec_key,
            raw,
            tree,
            "component_activity",
            &ACTIVITY_LAYOUT,
            |entry| {
                let events = metric_i64(entry.get("events").or_else(|| entry.get("doc_count")));
                let active = i64::from(events > 0);
                ComponentMetrics {
                    total: events,
                    duration_sum: 0.0,
                    categories: vec![
                        CategoryMetric {
                            count: active,
                            duration_sum: 0.0,
                        },
                        CategoryMetric {
                            count: 1 - active,
                            duration_sum: 0.0,
                        },
                    ],
                }
            },
        )
    }
}
