//! Component comparison trees: per-component metrics rolled up an
//! organization tree.

mod families;

pub use families::{ComponentActivity, ComponentCycleTime, ComponentFindings};

use std::collections::BTreeMap;

use beacon_types::{ComparisonNode, ComparisonSection, ComponentRef, OrganizationNode, SectionEntry};

use crate::numeric::average_millis;

/// How `value_in_millis` is derived for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Plain counts; `value_in_millis` stays zero.
    Count,
    /// `value_in_millis` is `Σduration / Σcount` over the subtree. Parents
    /// do not sum their children's averages; counts still sum.
    Duration,
}

/// Raw sums for one category of a component or subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryMetric {
    pub count: i64,
    pub duration_sum: f64,
}

/// Raw sums for one component or subtree. Sums are kept unrounded so that
/// averages are rounded once per node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentMetrics {
    pub total: i64,
    pub duration_sum: f64,
    pub categories: Vec<CategoryMetric>,
}

impl ComponentMetrics {
    fn plus(mut self, other: &ComponentMetrics) -> Self {
        self.total += other.total;
        self.duration_sum += other.duration_sum;
        for (slot, category) in self.categories.iter_mut().zip(&other.categories) {
            slot.count += category.count;
            slot.duration_sum += category.duration_sum;
        }
        self
    }
}

/// Fixed section layout of a comparison family.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonLayout {
    pub titles: &'static [&'static str],
    pub kind: MetricKind,
    /// Category counted once for components missing from the results, such
    /// as `Inactive`; `None` leaves their section all zero.
    pub absent_category: Option<usize>,
}

impl ComparisonLayout {
    fn zero(&self) -> ComponentMetrics {
        ComponentMetrics {
            total: 0,
            duration_sum: 0.0,
            categories: vec![CategoryMetric::default(); self.titles.len()],
        }
    }

    fn absent(&self) -> ComponentMetrics {
        let mut metrics = self.zero();
        if let Some(slot) = self
            .absent_category
            .and_then(|index| metrics.categories.get_mut(index))
        {
            slot.count = 1;
        }
        metrics
    }

    /// Pads or truncates `metrics` to this layout's categories.
    fn aligned(&self, metrics: &ComponentMetrics) -> ComponentMetrics {
        let mut aligned = metrics.clone();
        aligned
            .categories
            .resize(self.titles.len(), CategoryMetric::default());
        aligned
    }

    fn millis(&self, duration_sum: f64, count: i64) -> i64 {
        match self.kind {
            MetricKind::Count => 0,
            MetricKind::Duration => average_millis(duration_sum, count),
        }
    }

    fn section(&self, metrics: &ComponentMetrics) -> ComparisonSection {
        ComparisonSection {
            data: self
                .titles
                .iter()
                .zip(&metrics.categories)
                .map(|(title, category)| SectionEntry {
                    title: (*title).to_string(),
                    value: category.count,
                    value_in_millis: self.millis(category.duration_sum, category.count),
                })
                .collect(),
        }
    }
}

struct Assembled {
    node: ComparisonNode,
    metrics: ComponentMetrics,
}

/// Builds the comparison node for `tree`, whose children mirror the tree.
///
/// Components absent from `metrics` contribute zeros (or the layout's absent
/// category); ids in `metrics` that the tree does not contain are ignored.
pub fn assemble(
    tree: &OrganizationNode,
    metrics: &BTreeMap<String, ComponentMetrics>,
    layout: &ComparisonLayout,
) -> ComparisonNode {
    assemble_sub_org(tree, metrics, layout).node
}

fn assemble_component(
    component: &ComponentRef,
    metrics: &BTreeMap<String, ComponentMetrics>,
    layout: &ComparisonLayout,
) -> Assembled {
    let metrics = metrics
        .get(&component.id)
        .map(|found| layout.aligned(found))
        .unwrap_or_else(|| layout.absent());
    Assembled {
        node: ComparisonNode {
            is_sub_org: false,
            id: component.id.clone(),
            title: component.name.clone(),
            sub_org_count: 0,
            component_count: 1,
            total_value: metrics.total,
            value_in_millis: layout.millis(metrics.duration_sum, metrics.total),
            children: Vec::new(),
            section: layout.section(&metrics),
        },
        metrics,
    }
}

fn assemble_sub_org(
    org: &OrganizationNode,
    metrics: &BTreeMap<String, ComponentMetrics>,
    layout: &ComparisonLayout,
) -> Assembled {
    let children: Vec<Assembled> = org
        .components
        .iter()
        .map(|component| assemble_component(component, metrics, layout))
        .chain(
            org.sub_orgs
                .iter()
                .map(|sub_org| assemble_sub_org(sub_org, metrics, layout)),
        )
        .collect();

    let rolled_up = children
        .iter()
        .fold(layout.zero(), |sum, child| sum.plus(&child.metrics));
    let mut nodes: Vec<ComparisonNode> = children.into_iter().map(|child| child.node).collect();
    sort_level(&mut nodes);

    Assembled {
        node: ComparisonNode {
            is_sub_org: true,
            id: org.id.clone(),
            title: org.name.clone(),
            sub_org_count: org.sub_orgs.len() as u64,
            component_count: org.components.len() as u64,
            total_value: rolled_up.total,
            value_in_millis: layout.millis(rolled_up.duration_sum, rolled_up.total),
            children: nodes,
            section: layout.section(&rolled_up),
        },
        metrics: rolled_up,
    }
}

/// Sub-orgs first, then components; case-insensitive by title, stable.
fn sort_level(nodes: &mut [ComparisonNode]) {
    nodes.sort_by(|left, right| {
        right
            .is_sub_org
            .cmp(&left.is_sub_org)
            .then_with(|| left.title.to_lowercase().cmp(&right.title.to_lowercase()))
    });
}
