use beacon_postprocess::ProcessorRegistry;
use beacon_types::{
    Bindings, RawResults, RegionKind, RegionOutput, RegionSpec, ResolvedSpec, SpecSource,
    WidgetDefinition, WidgetError, WidgetResult,
};
use serde_json::Value;

/// Progress of a [`WidgetBuilder`]; regions are resolved in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    Init,
    HeaderDone,
    SectionDone,
    FooterDone,
    DataDone,
}

impl BuildStage {
    fn next(self) -> Option<(RegionKind, BuildStage)> {
        match self {
            Self::Init => Some((RegionKind::Header, Self::HeaderDone)),
            Self::HeaderDone => Some((RegionKind::Section, Self::SectionDone)),
            Self::SectionDone => Some((RegionKind::Footer, Self::FooterDone)),
            Self::FooterDone => Some((RegionKind::Data, Self::DataDone)),
            Self::DataDone => None,
        }
    }
}

/// Resolves the regions of one widget against its raw results.
pub struct WidgetBuilder<'a> {
    definition: &'a WidgetDefinition,
    raw: &'a RawResults,
    bindings: &'a Bindings,
    processors: &'a ProcessorRegistry,
    stage: BuildStage,
    regions: Vec<RegionOutput>,
}

impl<'a> WidgetBuilder<'a> {
    pub fn new(
        definition: &'a WidgetDefinition,
        raw: &'a RawResults,
        bindings: &'a Bindings,
        processors: &'a ProcessorRegistry,
    ) -> Self {
        Self {
            definition,
            raw,
            bindings,
            processors,
            stage: BuildStage::Init,
            regions: Vec::new(),
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Resolves the next region. A region the definition leaves out
    /// advances the stage without output; a declared region with no specs
    /// is emitted empty.
    pub fn step(&mut self) -> WidgetResult<BuildStage> {
        let Some((kind, next)) = self.stage.next() else {
            return Ok(self.stage);
        };
        if let Some(region) = self.definition.region(kind) {
            let specs = region
                .specs
                .iter()
                .enumerate()
                .map(|(index, spec)| self.resolve(kind, index, spec))
                .collect::<WidgetResult<Vec<_>>>()?;
            self.regions.push(RegionOutput { kind, specs });
        }
        self.stage = next;
        Ok(self.stage)
    }

    /// Runs every remaining stage and returns the regions in order.
    pub fn finish(mut self) -> WidgetResult<Vec<RegionOutput>> {
        while self.step()? != BuildStage::DataDone {}
        Ok(self.regions)
    }

    fn resolve(&self, kind: RegionKind, index: usize, spec: &RegionSpec) -> WidgetResult<ResolvedSpec> {
        let data = match spec.source(&self.definition.id)? {
            SpecSource::PostProcessor { name, spec_key } => {
                self.processors
                    .process(name, spec_key, self.raw, self.bindings)?
            }
            SpecSource::Function { name, spec_key } => {
                let payload = self.raw.require(name)?;
                match spec_key {
                    Some(spec_key) => payload
                        .get(spec_key)
                        .cloned()
                        .ok_or_else(|| WidgetError::spec_key_unknown(name, spec_key))?,
                    None => payload.clone(),
                }
            }
        };
        check_shape(kind, index, &data)?;
        Ok(ResolvedSpec::from_spec(spec, data))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Headers and footers are objects, sections are arrays; data is free-form.
fn check_shape(kind: RegionKind, index: usize, data: &Value) -> WidgetResult<()> {
    let expected = match kind {
        RegionKind::Header | RegionKind::Footer => "object",
        RegionKind::Section => "array",
        RegionKind::Data => return Ok(()),
    };
    let actual = json_kind(data);
    if actual == expected {
        return Ok(());
    }
    Err(WidgetError::RegionShapeMismatch {
        region: kind.as_str(),
        index,
        expected,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use beacon_postprocess::{PostProcessor, ProcessorRegistry};
    use beacon_types::{
        Bindings, RawResults, RegionKind, WidgetDefinition, WidgetError, WidgetResult,
    };
    use serde_json::{json, Value};

    use super::{BuildStage, WidgetBuilder};

    struct Fixed;

    impl PostProcessor for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn process(&self, spec_key: &str, _raw: &RawResults, _bindings: &Bindings) -> WidgetResult<Value> {
            match spec_key {
                "header" => Ok(json!({"value": 3})),
                "rows" => Ok(json!([{"title": "A", "value": 3}])),
                "scalar" => Ok(json!(3)),
                other => Err(WidgetError::spec_key_unknown("fixed", other)),
            }
        }
    }

    fn registry() -> ProcessorRegistry {
        let mut registry = ProcessorRegistry::new();
        registry.register(Fixed);
        registry
    }

    fn definition(regions: Value) -> WidgetDefinition {
        serde_json::from_value(json!({"id": "w", "title": "W", "regions": regions}))
            .expect("definition")
    }

    #[test]
    fn functional_builder_walks_stages_and_keeps_declared_empty_regions() {
        let definition = definition(json!([
            {"kind": "header", "specs": [{"postProcessFunctionName": "fixed", "specKey": "header", "title": "Runs"}]},
            {"kind": "section", "specs": []},
            {"kind": "data", "specs": [{"postProcessFunctionName": "fixed", "specKey": "scalar"}]}
        ]));
        let raw = RawResults::new();
        let bindings = Bindings::new();
        let registry = registry();
        let mut builder = WidgetBuilder::new(&definition, &raw, &bindings, &registry);

        assert_eq!(builder.stage(), BuildStage::Init);
        assert_eq!(builder.step().expect("header"), BuildStage::HeaderDone);
        assert_eq!(builder.step().expect("section"), BuildStage::SectionDone);
        let regions = builder.finish().expect("regions");

        let kinds: Vec<RegionKind> = regions.iter().map(|region| region.kind).collect();
        assert_eq!(
            kinds,
            vec![RegionKind::Header, RegionKind::Section, RegionKind::Data]
        );
        assert!(regions[1].specs.is_empty());
        assert_eq!(regions[0].specs[0].title.as_deref(), Some("Runs"));
        assert_eq!(regions[0].specs[0].data, json!({"value": 3}));
    }

    #[test]
    fn regression_empty_section_is_emitted_without_producer_calls() {
        let definition = definition(json!([
            {"kind": "header", "specs": [{"functionName": "orgSummary", "specKey": "header"}]},
            {"kind": "section", "specs": []}
        ]));
        let raw = RawResults::new().with("orgSummary", json!({"header": {"value": 1}}));
        let bindings = Bindings::new();
        let registry = ProcessorRegistry::new();
        let regions = WidgetBuilder::new(&definition, &raw, &bindings, &registry)
            .finish()
            .expect("regions");

        let kinds: Vec<RegionKind> = regions.iter().map(|region| region.kind).collect();
        assert_eq!(kinds, vec![RegionKind::Header, RegionKind::Section]);
        assert!(regions[1].specs.is_empty());
    }

    #[test]
    fn functional_function_specs_index_payload_by_spec_key() {
        let definition = definition(json!([
            {"kind": "header", "specs": [{"functionName": "orgSummary", "specKey": "header"}]},
            {"kind": "footer", "specs": [{"functionName": "orgSummary"}]}
        ]));
        let raw = RawResults::new().with("orgSummary", json!({"header": {"value": 9}}));
        let bindings = Bindings::new();
        let registry = registry();
        let regions = WidgetBuilder::new(&definition, &raw, &bindings, &registry)
            .finish()
            .expect("regions");
        assert_eq!(regions[0].specs[0].data, json!({"value": 9}));
        assert_eq!(regions[1].specs[0].data, json!({"header": {"value": 9}}));
    }

    #[test]
    fn regression_section_must_be_an_array() {
        let definition = definition(json!([
            {"kind": "section", "specs": [
                {"postProcessFunctionName": "fixed", "specKey": "rows"},
                {"postProcessFunctionName": "fixed", "specKey": "header"}
            ]}
        ]));
        let raw = RawResults::new();
        let bindings = Bindings::new();
        let registry = registry();
        let error = WidgetBuilder::new(&definition, &raw, &bindings, &registry)
            .finish()
            .expect_err("shape");
        assert_eq!(
            error,
            WidgetError::RegionShapeMismatch {
                region: "section",
                index: 1,
                expected: "array",
                actual: "object",
            }
        );
    }

    #[test]
    fn functional_region_error_halts_the_build() {
        let definition = definition(json!([
            {"kind": "header", "specs": [{"postProcessFunctionName": "fixed", "specKey": "nope"}]},
            {"kind": "section", "specs": [{"postProcessFunctionName": "missing", "specKey": "rows"}]}
        ]));
        let raw = RawResults::new();
        let bindings = Bindings::new();
        let registry = registry();
        let mut builder = WidgetBuilder::new(&definition, &raw, &bindings, &registry);
        let error = builder.step().expect_err("spec key");
        assert_eq!(error.code(), "spec_key_unknown");
        assert_eq!(builder.stage(), BuildStage::Init);
    }

    #[test]
    fn unit_missing_function_result_is_query_key_missing() {
        let definition = definition(json!([
            {"kind": "header", "specs": [{"functionName": "orgSummary", "specKey": "header"}]}
        ]));
        let raw = RawResults::new();
        let bindings = Bindings::new();
        let registry = registry();
        let error = WidgetBuilder::new(&definition, &raw, &bindings, &registry)
            .finish()
            .expect_err("missing");
        assert_eq!(error.code(), "query_key_missing");
    }
}
