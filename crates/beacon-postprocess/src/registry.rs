use std::collections::BTreeMap;
use std::sync::Arc;

use beacon_types::{Bindings, ComparisonNode, OrganizationNode, RawResults, WidgetError, WidgetResult};
use serde_json::Value;

use crate::comparison::{ComponentActivity, ComponentCycleTime, ComponentFindings};
use crate::families::{AutomationRuns, CweTop25, Deployments, Mttr, OpenFindings, WorkItems};

/// Transforms raw results into the payload of one widget region.
///
/// One processor serves every region of a widget family and branches on the
/// spec key. Implementations are pure: identical inputs yield identical output.
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, spec_key: &str, raw: &RawResults, bindings: &Bindings) -> WidgetResult<Value>;
}

/// Builds the component comparison tree for one comparison family.
pub trait ComparisonProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(
        &self,
        spec_key: &str,
        raw: &RawResults,
        bindings: &Bindings,
        tree: &OrganizationNode,
    ) -> WidgetResult<ComparisonNode>;
}

/// Closed, process-wide `name → processor` table built at startup.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    widgets: BTreeMap<String, Arc<dyn PostProcessor>>,
    comparisons: BTreeMap<String, Arc<dyn ComparisonProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in widget and comparison family.
    pub fn with_builtin_families() -> Self {
        let mut registry = Self::new();
        registry.register(Deployments);
        registry.register(AutomationRuns);
        registry.register(OpenFindings);
        registry.register(CweTop25);
        registry.register(WorkItems);
        registry.register(Mttr);
        registry.register_comparison(ComponentCycleTime);
        registry.register_comparison(ComponentFindings);
        registry.register_comparison(ComponentActivity);
        registry
    }

    pub fn register<P>(&mut self, processor: P)
    where
        P: PostProcessor + 'static,
    {
        self.widgets
            .insert(processor.name().to_string(), Arc::new(processor));
    }

    pub fn register_comparison<P>(&mut self, processor: P)
    where
        P: ComparisonProcessor + 'static,
    {
        self.comparisons
            .insert(processor.name().to_string(), Arc::new(processor));
    }

    pub fn has_processor(&self, name: &str) -> bool {
        self.widgets.contains_key(name) || self.comparisons.contains_key(name)
    }

    /// Returns sorted registered widget processor names.
    pub fn processor_names(&self) -> Vec<String> {
        self.widgets.keys().cloned().collect()
    }

    pub fn comparison_names(&self) -> Vec<String> {
        self.comparisons.keys().cloned().collect()
    }

    pub fn process(
        &self,
        name: &str,
        spec_key: &str,
        raw: &RawResults,
        bindings: &Bindings,
    ) -> WidgetResult<Value> {
        let processor = self
            .widgets
            .get(name)
            .ok_or_else(|| WidgetError::PostProcessorUnknown {
                name: name.to_string(),
            })?;
        processor.process(spec_key, raw, bindings)
    }

    pub fn process_comparison(
        &self,
        name: &str,
        spec_key: &str,
        raw: &RawResults,
        bindings: &Bindings,
        tree: &OrganizationNode,
    ) -> WidgetResult<ComparisonNode> {
        let processor =
            self.comparisons
                .get(name)
                .ok_or_else(|| WidgetError::PostProcessorUnknown {
                    name: name.to_string(),
                })?;
        processor.process(spec_key, raw, bindings, tree)
    }
}
