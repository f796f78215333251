use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_catalog::{CatalogEntry, DefinitionSnapshot, DefinitionStore};
use beacon_core::CooperativeCancellationToken;
use beacon_engine::{Engine, FunctionRegistry, OrgSummary};
use beacon_query::{BaseFilters, FilterComposer};
use beacon_store::{
    AnalyticsStore, ExecutorConfig, OrganizationDirectory, QueryExecutor, SearchOutcome,
    SearchRequest, StoreError,
};
use beacon_types::{
    names, BindingValue, Bindings, ComparisonDefinition, OrganizationNode, RegionKind,
    WidgetDefinition, WidgetError,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

struct ScriptedStore {
    payloads: BTreeMap<String, Value>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl ScriptedStore {
    fn new(payloads: &[(&str, Value)]) -> Arc<Self> {
        Arc::new(Self {
            payloads: payloads
                .iter()
                .map(|(name, payload)| (name.to_string(), payload.clone()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request(&self, name: &str) -> SearchRequest {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .find(|request| request.name == name)
            .cloned()
            .expect("request was sent")
    }
}

#[async_trait]
impl AnalyticsStore for ScriptedStore {
    async fn multi_search(
        &self,
        requests: &[SearchRequest],
        _token: &CooperativeCancellationToken,
    ) -> Result<Vec<SearchOutcome>, StoreError> {
        self.requests
            .lock()
            .expect("requests lock")
            .extend(requests.iter().cloned());
        Ok(requests
            .iter()
            .map(|request| match self.payloads.get(&request.name) {
                Some(payload) => SearchOutcome::Hit(payload.clone()),
                None => SearchOutcome::Failed("index_not_found_exception".to_string()),
            })
            .collect())
    }
}

struct StaticDirectory {
    tree: OrganizationNode,
}

#[async_trait]
impl OrganizationDirectory for StaticDirectory {
    async fn get_organization(
        &self,
        _org_id: &str,
        _token: &CooperativeCancellationToken,
    ) -> Result<OrganizationNode, StoreError> {
        Ok(self.tree.clone())
    }
}

fn widget(value: Value) -> WidgetDefinition {
    serde_json::from_value(value).expect("widget definition")
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0)
        .single()
        .expect("timestamp")
}

fn engine_with(snapshot: DefinitionSnapshot, store: Arc<ScriptedStore>) -> Engine {
    Engine::new(
        Arc::new(DefinitionStore::from_snapshot(snapshot)),
        FilterComposer::new(Vec::<String>::new(), chrono_tz::UTC),
        QueryExecutor::new(store, ExecutorConfig::default()),
    )
}

fn widget_engine(id: &str, definition: Value, store: Arc<ScriptedStore>) -> Engine {
    let mut snapshot = DefinitionSnapshot::new();
    snapshot
        .insert_widget(id, CatalogEntry::Single(widget(definition)))
        .expect("insert widget");
    engine_with(snapshot, store)
}

fn region_data(output: &beacon_types::WidgetOutput, kind: RegionKind, index: usize) -> Value {
    output
        .regions
        .iter()
        .find(|region| region.kind == kind)
        .and_then(|region| region.specs.get(index))
        .map(|spec| spec.data.clone())
        .expect("region spec")
}

fn march_bindings() -> Bindings {
    Bindings::new()
        .with(names::START_DATE, BindingValue::text("2024-03-01"))
        .with(names::END_DATE, BindingValue::text("2024-03-31"))
        .with(names::DURATION, BindingValue::text("month"))
}

fn status_bucket(key: &str, success: i64, failure: i64) -> Value {
    json!({"key_as_string": key, "status": {"buckets": [
        {"key": "SUCCESS", "doc_count": success},
        {"key": "FAILURE", "doc_count": failure}
    ]}})
}

#[tokio::test]
async fn integration_deployments_time_series_overrides_first_point_date() {
    let store = ScriptedStore::new(&[(
        "deployments",
        json!({"aggregations": {"deployments": {"buckets": [
            status_bucket("2024-05-27", 0, 0),
            status_bucket("2024-06-03", 34, 22),
            status_bucket("2024-06-10", 0, 0),
            status_bucket("2024-06-17", 0, 0),
            status_bucket("2024-06-24", 0, 1)
        ]}}}),
    )]);
    let engine = widget_engine(
        "deployments",
        json!({
            "title": "Deployments",
            "regions": [
                {"kind": "header", "specs": [{"postProcessFunctionName": "deployments", "specKey": "header"}]},
                {"kind": "section", "specs": [{"postProcessFunctionName": "deployments", "specKey": "chart", "chartType": "line"}]}
            ],
            "queries": {"deployments": {"alias": "deployments", "template": {
                "size": 0,
                "aggs": {"deployments": {"date_histogram": {
                    "field": "deployed_at",
                    "calendar_interval": "$dateHistogramInterval",
                    "extended_bounds": {"min": "$dateHistogramMin", "max": "$dateHistogramMax"}
                }}}
            }}}
        }),
        Arc::clone(&store),
    );

    let output = engine
        .build_widget_at(
            "deployments",
            march_bindings().with(names::NORMALIZE_MONTH, BindingValue::text("2024-03-01")),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect("widget");

    let chart = region_data(&output, RegionKind::Section, 0);
    let series = chart.as_array().expect("series");
    let ids: Vec<&str> = series.iter().filter_map(|entry| entry["id"].as_str()).collect();
    assert_eq!(ids, vec!["Success", "Failure"]);
    for entry in series {
        assert_eq!(entry["data"].as_array().map(Vec::len), Some(5));
    }
    assert_eq!(series[0]["data"][1]["x"], "2024-06-03");
    assert_eq!(series[0]["data"][1]["y"], 34);
    assert_eq!(
        series[0]["data"][0]["date"],
        json!({"startDate": "2024-03-01", "endDate": "2024-03-03"})
    );
    assert_eq!(region_data(&output, RegionKind::Header, 0), json!({"value": 57}));

    let sent = store.request("deployments");
    let histogram = &sent.body["aggs"]["deployments"]["date_histogram"];
    assert_eq!(histogram["calendar_interval"], "week");
    assert_eq!(histogram["extended_bounds"]["min"], "2024-02-26");
    assert_eq!(histogram["extended_bounds"]["max"], "2024-03-31");
}

#[tokio::test]
async fn integration_automation_runs_header_and_sub_header() {
    let store = ScriptedStore::new(&[(
        "automation_run",
        json!({"aggregations": {"automation_run": {"value": {"data": [
            {"Success": 5354},
            {"Failure": 897}
        ]}}}}),
    )]);
    let engine = widget_engine(
        "automation-runs",
        json!({
            "title": "Automation runs",
            "regions": [{"kind": "header", "specs": [
                {"postProcessFunctionName": "automationRuns", "specKey": "header", "title": "Runs"},
                {"postProcessFunctionName": "automationRuns", "specKey": "subHeader"}
            ]}],
            "queries": {"automation_run": {"alias": "automation-runs", "template": {"size": 0}}}
        }),
        store,
    );

    let output = engine
        .build_widget_at(
            "automation-runs",
            march_bindings(),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect("widget");

    assert_eq!(output.regions.len(), 1);
    assert_eq!(output.regions[0].specs[0].title.as_deref(), Some("Runs"));
    assert_eq!(region_data(&output, RegionKind::Header, 0), json!({"value": 6251}));
    let sub_header = region_data(&output, RegionKind::Header, 1);
    let entries = sub_header["subHeader"].as_array().expect("entries");
    assert_eq!(entries[0]["title"], "Success");
    assert_eq!(entries[0]["value"], 5354);
    assert_eq!(entries[1]["title"], "Failure");
    assert_eq!(entries[1]["value"], 897);
    assert!(entries[1]["drillDown"]["reportId"].is_string());
}

#[tokio::test]
async fn integration_cycle_time_comparison_rolls_up_weighted_averages() {
    let store = ScriptedStore::new(&[(
        "cycle_time",
        json!({"aggregations": {"components": {"value": {
            "C1": {"DEFECT_TIME": 477737000.0, "DEFECT_COUNT": 5},
            "C11": {"DEFECT_TIME": 770734000.0, "DEFECT_COUNT": 2}
        }}}}),
    )]);
    let directory: Arc<dyn OrganizationDirectory> = Arc::new(StaticDirectory {
        tree: OrganizationNode::new("org-1", "Acme")
            .with_component("C1", "C1")
            .with_sub_org(OrganizationNode::new("S1", "S1").with_component("C11", "C11")),
    });
    let definition: ComparisonDefinition = serde_json::from_value(json!({
        "title": "Cycle time",
        "postProcessFunctionName": "componentCycleTime",
        "functions": ["orgSummary"],
        "regions": [{"kind": "header", "specs": [{"functionName": "orgSummary", "specKey": "header"}]}],
        "queries": {"cycle_time": {"alias": "work-items", "template":
            "{\"query\": {\"range\": {\"resolved_at\": {\"gte\": \"$startDate\", \"lte\": \"$endDate\"}}}}"}}
    }))
    .expect("comparison definition");
    let mut snapshot = DefinitionSnapshot::new();
    snapshot
        .insert_comparison("cycle-time", CatalogEntry::Single(definition))
        .expect("insert comparison");
    let mut functions = FunctionRegistry::new();
    functions.register(OrgSummary::new(Arc::clone(&directory)));
    let engine = engine_with(snapshot, store)
        .with_directory(directory)
        .with_functions(functions);

    let output = engine
        .build_comparison_at(
            "cycle-time",
            march_bindings().with(names::ORG_ID, BindingValue::text("org-1")),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect("comparison");

    let ids: Vec<&str> = output.nodes.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec!["S1", "C1"]);
    let s1 = &output.nodes[0];
    let c1 = &output.nodes[1];
    assert_eq!(c1.value_in_millis, 95_547_400);
    assert_eq!(s1.children.len(), 1);
    assert_eq!(s1.children[0].id, "C11");
    assert_eq!(s1.children[0].value_in_millis, 385_367_000);
    assert_eq!(s1.value_in_millis, 385_367_000);
    assert_eq!(output.total_value, 7);
    assert_eq!(output.value_in_millis, 178_353_000);
    assert_eq!(output.regions[0].specs[0].data, json!({"value": 2}));
}

#[tokio::test]
async fn integration_cwe_top25_omits_zero_entries_in_server_order() {
    let store = ScriptedStore::new(&[(
        "cwe_top25",
        json!({"aggregations": {"cwe_top25": {"value": [
            {"cweId": "CWE-79", "issuesFound": 12},
            {"cweId": "CWE-89", "issuesFound": 0},
            {"cweId": "CWE-22", "issuesFound": 30},
            {"cweId": "CWE-787", "issuesFound": 4}
        ]}}}),
    )]);
    let engine = widget_engine(
        "cwe-top25",
        json!({
            "title": "CWE Top 25",
            "regions": [{"kind": "section", "specs": [{"postProcessFunctionName": "cweTop25", "specKey": "table"}]}],
            "queries": {"cwe_top25": {"alias": "findings", "template": {"size": 0}}}
        }),
        store,
    );

    let output = engine
        .build_widget_at(
            "cwe-top25",
            march_bindings(),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect("widget");

    let table = region_data(&output, RegionKind::Section, 0);
    let titles: Vec<&str> = table
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|row| row["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["CWE-79", "CWE-22", "CWE-787"]);
}

fn open_findings_definition() -> Value {
    json!({
        "title": "Open findings",
        "accepts": ["severities"],
        "regions": [
            {"kind": "header", "specs": [{"postProcessFunctionName": "openFindings", "specKey": "header"}]},
            {"kind": "section", "specs": [{"postProcessFunctionName": "openFindings", "specKey": "severity"}]}
        ],
        "queries": {"open_findings": {"alias": "findings", "template": {
            "query": {"range": {"detected_at": {"gte": "$startDate", "lte": "$endDate"}}}
        }}},
        "pastQueries": {"open_findings_past": {"alias": "findings", "template": {
            "query": {"range": {"detected_at": {"gte": "$p_startDate", "lte": "$p_endDate"}}}
        }}}
    })
}

fn severity_payload(counts: &[(&str, i64)]) -> Value {
    let buckets: Vec<Value> = counts
        .iter()
        .map(|(key, count)| json!({"key": key, "doc_count": count}))
        .collect();
    json!({"aggregations": {"severity": {"buckets": buckets}}})
}

#[tokio::test]
async fn integration_open_findings_emit_four_severities_without_information() {
    let store = ScriptedStore::new(&[
        (
            "open_findings",
            severity_payload(&[
                ("VERY_HIGH", 1),
                ("HIGH", 1),
                ("MEDIUM", 1),
                ("LOW", 0),
                ("INFORMATION", 50),
            ]),
        ),
        ("open_findings_past", severity_payload(&[("HIGH", 3)])),
    ]);
    let engine = widget_engine("open-findings", open_findings_definition(), store);

    let output = engine
        .build_widget_at(
            "open-findings",
            march_bindings(),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect("widget");

    let rows = region_data(&output, RegionKind::Section, 0);
    let rows = rows.as_array().expect("rows");
    let titles: Vec<&str> = rows.iter().filter_map(|row| row["title"].as_str()).collect();
    assert_eq!(titles, vec!["Very high", "High", "Medium", "Low"]);
    let total: f64 = rows.iter().filter_map(|row| row["percentage"].as_f64()).sum();
    assert!((total - 100.0).abs() <= 0.01, "{total}");
    assert_eq!(region_data(&output, RegionKind::Header, 0)["value"], 3);
}

#[tokio::test]
async fn integration_trend_widget_queries_previous_calendar_month() {
    let store = ScriptedStore::new(&[
        ("open_findings", severity_payload(&[("HIGH", 6)])),
        ("open_findings_past", severity_payload(&[("HIGH", 4)])),
    ]);
    let engine = widget_engine("open-findings", open_findings_definition(), Arc::clone(&store));
    let bindings = Bindings::new()
        .with(names::DURATION, BindingValue::text("month"))
        .with(names::END_DATE, BindingValue::text("2024-03-31"));

    let output = engine
        .build_widget_at(
            "open-findings",
            bindings,
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect("widget");

    let past = store.request("open_findings_past");
    let range = &past.body["query"]["range"]["detected_at"];
    assert_eq!(range["gte"], "2024-02-01");
    assert_eq!(range["lte"], "2024-02-29");
    let current = store.request("open_findings");
    assert_eq!(current.body["query"]["range"]["detected_at"]["gte"], "2024-03-01");
    assert_eq!(
        region_data(&output, RegionKind::Header, 0),
        json!({"value": 6, "subtitle": "+50.00% vs previous period"})
    );
}

#[tokio::test]
async fn integration_base_filters_and_scope_reach_the_store() {
    let store = ScriptedStore::new(&[("open_findings", severity_payload(&[("LOW", 2)]))]);
    let mut definition = open_findings_definition();
    definition["pastQueries"] = json!({});
    let engine = widget_engine("open-findings", definition, Arc::clone(&store));
    let base_filters = BaseFilters::from([("team".to_string(), vec!["blue".to_string()])]);

    engine
        .build_widget_at(
            "open-findings",
            march_bindings()
                .with(names::COMPONENT, BindingValue::list(["c-1"]))
                .with(names::SEVERITIES, BindingValue::list(["HIGH"])),
            &base_filters,
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect("widget");

    let sent = store.request("open_findings");
    let filters = sent.body["query"]["bool"]["filter"]
        .as_array()
        .expect("filters")
        .clone();
    assert_eq!(filters[0], json!({"terms": {"component_id": ["c-1"]}}));
    assert_eq!(filters[1], json!({"terms": {"severity": ["HIGH"]}}));
    assert_eq!(filters[2], json!({"terms": {"team": ["blue"]}}));
}

#[tokio::test]
async fn integration_failures_surface_as_error_bodies() {
    let store = ScriptedStore::new(&[]);
    let engine = widget_engine("open-findings", open_findings_definition(), store);

    let missing = engine
        .build_widget_at(
            "nope",
            march_bindings(),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect_err("unknown widget");
    assert_eq!(missing.to_body().code, "definition_not_found");

    let failed = engine
        .build_widget_at(
            "open-findings",
            march_bindings(),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect_err("store rejected the query");
    assert_eq!(failed.code(), "query_failed");
    assert!(!failed.to_body().message.contains("index_not_found_exception"));

    let token = CooperativeCancellationToken::new();
    token.cancel();
    let cancelled = engine
        .build_widget_at("open-findings", march_bindings(), &BaseFilters::new(), now(), &token)
        .await
        .expect_err("cancelled");
    assert_eq!(cancelled, WidgetError::Cancelled);
}

#[tokio::test]
async fn integration_comparison_without_directory_is_service_unavailable() {
    let store = ScriptedStore::new(&[(
        "component_activity",
        json!({"aggregations": {"components": {"buckets": []}}}),
    )]);
    let definition: ComparisonDefinition = serde_json::from_value(json!({
        "title": "Activity",
        "postProcessFunctionName": "componentActivity",
        "queries": {"component_activity": {"alias": "events", "template": {"size": 0}}}
    }))
    .expect("comparison definition");
    let mut snapshot = DefinitionSnapshot::new();
    snapshot
        .insert_comparison("activity", CatalogEntry::Single(definition))
        .expect("insert comparison");
    let engine = engine_with(snapshot, store);

    let error = engine
        .build_comparison_at(
            "activity",
            march_bindings().with(names::ORG_ID, BindingValue::text("org-1")),
            &BaseFilters::new(),
            now(),
            &CooperativeCancellationToken::new(),
        )
        .await
        .expect_err("no directory");
    assert_eq!(error.code(), "service_unavailable");
}
