use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use beacon_core::CooperativeCancellationToken;
use beacon_store::{BranchService, SearchRequest};
use beacon_types::{
    names, Bindings, RuntimeFilter, WidgetDefinition, WidgetError, WidgetResult,
};
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde_json::{json, Map, Value};

use crate::substitute::RenderedQuery;

/// Field holding the branch id in indices that expose it.
pub const BRANCH_ID_FIELD: &str = "branch_id";

const AUTOMATIONS_SERVICE: &str = "automations service";
const WITHIN_SLA: &str = "WITHIN_SLA";
const BREACHED_SLA: &str = "BREACHED_SLA";

/// Caller-supplied `field → values` replacements, applied as terms filters.
pub type BaseFilters = BTreeMap<String, Vec<String>>;

/// Injects the runtime filters of one request into rendered queries.
///
/// Bodies are rewritten in place on the rendered copies; definitions are
/// never touched.
#[derive(Clone)]
pub struct FilterComposer {
    branch_id_aliases: BTreeSet<String>,
    default_time_zone: Tz,
    branches: Option<Arc<dyn BranchService>>,
}

/// Branch lookups resolved at most once per request.
#[derive(Default)]
struct BranchResolution {
    name: Option<String>,
    automation_ids: Option<Vec<String>>,
}

impl FilterComposer {
    pub fn new(branch_id_aliases: impl IntoIterator<Item = String>, default_time_zone: Tz) -> Self {
        Self {
            branch_id_aliases: branch_id_aliases.into_iter().collect(),
            default_time_zone,
            branches: None,
        }
    }

    pub fn with_branch_service(mut self, branches: Arc<dyn BranchService>) -> Self {
        self.branches = Some(branches);
        self
    }

    /// Adds scope, branch, tool/severity, SLA and base filters, in that order,
    /// to every query and returns the store requests.
    #[tracing::instrument(skip_all, fields(widget_id = %definition.id, queries = queries.len()))]
    pub async fn compose(
        &self,
        definition: &WidgetDefinition,
        queries: Vec<RenderedQuery>,
        bindings: &Bindings,
        base_filters: &BaseFilters,
        now: DateTime<Utc>,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<Vec<SearchRequest>> {
        let shared = self.shared_clauses(definition, bindings, base_filters, now)?;
        let branch = bindings.text(names::BRANCH);
        let mut resolution = BranchResolution::default();
        let mut requests = Vec::with_capacity(queries.len());

        for query in queries {
            let mut clauses = Vec::with_capacity(shared.scope.len() + shared.rest.len() + 1);
            clauses.extend(shared.scope.iter().cloned());
            if let Some(branch) = branch {
                clauses.push(
                    self.branch_clause(&query, branch, &mut resolution, token)
                        .await?,
                );
            }
            clauses.extend(shared.rest.iter().cloned());

            let RenderedQuery {
                name, alias, mut body, ..
            } = query;
            inject_clauses(&name, &mut body, clauses)?;
            requests.push(SearchRequest { name, alias, body });
        }

        Ok(requests)
    }

    fn shared_clauses(
        &self,
        definition: &WidgetDefinition,
        bindings: &Bindings,
        base_filters: &BaseFilters,
        now: DateTime<Utc>,
    ) -> WidgetResult<SharedClauses> {
        let mut scope = Vec::new();
        let application_ids = specific_ids(bindings, names::APPLICATION);
        let component_ids = specific_ids(bindings, names::COMPONENT);
        match (definition.is_application_dashboard(), application_ids, component_ids) {
            (true, Some(ids), _) => scope.push(terms("application_id", &ids)),
            (_, _, Some(ids)) => scope.push(terms("component_id", &ids)),
            _ => {}
        }

        let mut rest = Vec::new();
        if definition.accepts(RuntimeFilter::Tools) {
            if let Some(ids) = specific_ids(bindings, names::TOOLS) {
                rest.push(terms("tool_id", &ids));
            }
        }
        if definition.accepts(RuntimeFilter::Severities) {
            if let Some(ids) = specific_ids(bindings, names::SEVERITIES) {
                rest.push(terms("severity", &ids));
            }
        }
        if definition.accepts(RuntimeFilter::Sla) {
            if let Some(sla) = bindings.text(names::SLA) {
                rest.push(self.sla_clause(sla, bindings, now)?);
            }
        }
        for (field, values) in base_filters {
            if !values.is_empty() {
                rest.push(terms(field, values));
            }
        }

        Ok(SharedClauses { scope, rest })
    }

    fn sla_clause(&self, sla: &str, bindings: &Bindings, now: DateTime<Utc>) -> WidgetResult<Value> {
        let time_zone = match bindings.text(names::TIME_ZONE) {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|_| WidgetError::PlaceholderTypeMismatch {
                    name: names::TIME_ZONE.to_string(),
                    expected: "IANA time zone",
                    actual: raw.to_string(),
                })?,
            None => self.default_time_zone,
        };
        let now_local = now
            .with_timezone(&time_zone)
            .to_rfc3339_opts(SecondsFormat::Secs, false);
        let operator = match sla {
            WITHIN_SLA => "gt",
            BREACHED_SLA => "lte",
            other => {
                return Err(WidgetError::PlaceholderTypeMismatch {
                    name: names::SLA.to_string(),
                    expected: "WITHIN_SLA|BREACHED_SLA",
                    actual: other.to_string(),
                })
            }
        };
        Ok(json!({"range": {"sla_breach_time": {operator: now_local}}}))
    }

    async fn branch_clause(
        &self,
        query: &RenderedQuery,
        branch: &str,
        resolution: &mut BranchResolution,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<Value> {
        if self.branch_id_aliases.contains(&query.alias) {
            return Ok(json!({"term": {BRANCH_ID_FIELD: branch}}));
        }

        let service = self.branches.as_ref().ok_or_else(|| WidgetError::ServiceUnavailable {
            service: AUTOMATIONS_SERVICE,
            detail: "no branch service configured".to_string(),
        })?;

        if query.branch_name_filter {
            if resolution.name.is_none() {
                let name = service
                    .branch_name_for_id(branch, token)
                    .await
                    .map_err(|error| error.into_service_error(AUTOMATIONS_SERVICE))?;
                resolution.name = Some(name.unwrap_or_else(|| branch.to_string()));
            }
            let name = resolution.name.as_deref().unwrap_or(branch);
            return Ok(json!({"term": {"branch": name}}));
        }

        if resolution.automation_ids.is_none() {
            let ids = service
                .automations_for_branch(branch, token)
                .await
                .map_err(|error| error.into_service_error(AUTOMATIONS_SERVICE))?;
            tracing::debug!(branch, automations = ids.len(), "resolved branch automations");
            resolution.automation_ids = Some(ids);
        }
        let ids = resolution.automation_ids.as_deref().unwrap_or_default();
        Ok(terms("automation_id", ids))
    }
}

struct SharedClauses {
    scope: Vec<Value>,
    rest: Vec<Value>,
}

fn specific_ids(bindings: &Bindings, name: &str) -> Option<Vec<String>> {
    let ids = bindings.list(name)?;
    if ids.is_empty() || ids.iter().any(|id| id == names::SCOPE_WILDCARD) {
        return None;
    }
    Some(ids)
}

fn terms(field: &str, values: &[String]) -> Value {
    json!({"terms": {field: values}})
}

/// Conjoins `clauses` with the query.
///
/// A top-level `bool.should` gets every disjunct's `must` list extended; any
/// other bool query gets its `filter` list extended; a non-bool query is
/// wrapped.
fn inject_clauses(name: &str, body: &mut Value, clauses: Vec<Value>) -> WidgetResult<()> {
    if clauses.is_empty() {
        return Ok(());
    }
    let Some(root) = body.as_object_mut() else {
        return Err(WidgetError::QueryTemplateInvalid {
            query: name.to_string(),
        });
    };

    let query = root
        .entry("query")
        .or_insert_with(|| json!({"bool": {}}));
    if !query.get("bool").is_some_and(Value::is_object) {
        let original = query.take();
        *query = json!({"bool": {"must": [original]}});
    }
    let Some(bool_query) = query.get_mut("bool").and_then(Value::as_object_mut) else {
        return Err(WidgetError::QueryTemplateInvalid {
            query: name.to_string(),
        });
    };

    let has_disjuncts = bool_query
        .get("should")
        .and_then(Value::as_array)
        .is_some_and(|disjuncts| !disjuncts.is_empty());
    if !has_disjuncts {
        if let Some(filters) = clause_list(bool_query, "filter") {
            filters.extend(clauses);
        }
        return Ok(());
    }

    if let Some(disjuncts) = bool_query.get_mut("should").and_then(Value::as_array_mut) {
        for disjunct in disjuncts.iter_mut() {
            if !disjunct.get("bool").is_some_and(Value::is_object) {
                let original = disjunct.take();
                *disjunct = json!({"bool": {"must": [original]}});
            }
            if let Some(inner) = disjunct.get_mut("bool").and_then(Value::as_object_mut) {
                if let Some(must) = clause_list(inner, "must") {
                    must.extend(clauses.iter().cloned());
                }
            }
        }
    }
    Ok(())
}

/// Returns the clause array under `key`, normalizing a single clause object.
fn clause_list<'a>(bool_query: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Vec<Value>> {
    let slot = bool_query
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        let single = slot.take();
        *slot = if single.is_null() {
            Value::Array(Vec::new())
        } else {
            Value::Array(vec![single])
        };
    }
    slot.as_array_mut()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use beacon_core::CooperativeCancellationToken;
    use beacon_store::{BranchService, StoreError};
    use beacon_types::{names, BindingValue, Bindings, WidgetDefinition};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::{inject_clauses, BaseFilters, FilterComposer};
    use crate::substitute::RenderedQuery;

    struct FakeBranches {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BranchService for FakeBranches {
        async fn automations_for_branch(
            &self,
            _branch_id: &str,
            _token: &CooperativeCancellationToken,
        ) -> Result<Vec<String>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["auto-1".to_string(), "auto-2".to_string()])
        }

        async fn branch_name_for_id(
            &self,
            _branch_id: &str,
            _token: &CooperativeCancellationToken,
        ) -> Result<Option<String>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some("main".to_string()))
        }
    }

    fn definition(value: Value) -> WidgetDefinition {
        serde_json::from_value(value).expect("definition")
    }

    fn query(name: &str, alias: &str, body: Value) -> RenderedQuery {
        RenderedQuery {
            name: name.to_string(),
            alias: alias.to_string(),
            body,
            branch_name_filter: false,
            is_past: false,
        }
    }

    fn composer() -> (FilterComposer, Arc<FakeBranches>) {
        let branches = Arc::new(FakeBranches {
            calls: AtomicUsize::new(0),
        });
        let composer = FilterComposer::new(["findings".to_string()], chrono_tz::UTC)
            .with_branch_service(branches.clone());
        (composer, branches)
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).single().expect("now")
    }

    #[tokio::test]
    async fn functional_filters_are_added_in_rule_order() {
        let (composer, _) = composer();
        let widget = definition(json!({
            "id": "findings",
            "title": "Findings",
            "accepts": ["tools", "severities", "sla"]
        }));
        let bindings = Bindings::new()
            .with(names::COMPONENT, BindingValue::list(["c-1"]))
            .with(names::BRANCH, BindingValue::text("b-1"))
            .with(names::TOOLS, BindingValue::list(["t-1"]))
            .with(names::SEVERITIES, BindingValue::list(["HIGH"]))
            .with(names::SLA, BindingValue::text("WITHIN_SLA"))
            .with(names::TIME_ZONE, BindingValue::text("America/New_York"));
        let mut base = BaseFilters::new();
        base.insert("status".to_string(), vec!["OPEN".to_string()]);

        let requests = composer
            .compose(
                &widget,
                vec![query("open", "findings", json!({"size": 0}))],
                &bindings,
                &base,
                now(),
                &CooperativeCancellationToken::new(),
            )
            .await
            .expect("compose");

        assert_eq!(
            requests[0].body["query"]["bool"]["filter"],
            json!([
                {"terms": {"component_id": ["c-1"]}},
                {"term": {"branch_id": "b-1"}},
                {"terms": {"tool_id": ["t-1"]}},
                {"terms": {"severity": ["HIGH"]}},
                {"range": {"sla_breach_time": {"gt": "2024-03-15T08:00:00-04:00"}}},
                {"terms": {"status": ["OPEN"]}}
            ])
        );
    }

    #[tokio::test]
    async fn functional_application_dashboard_scopes_by_application_unless_wildcard() {
        let (composer, _) = composer();
        let widget = definition(json!({
            "id": "apps",
            "title": "Apps",
            "tags": ["application-dashboard"]
        }));
        let token = CooperativeCancellationToken::new();

        let scoped = Bindings::new()
            .with(names::APPLICATION, BindingValue::list(["app-1"]))
            .with(names::COMPONENT, BindingValue::list(["c-1"]));
        let requests = composer
            .compose(
                &widget,
                vec![query("q", "idx", json!({}))],
                &scoped,
                &BaseFilters::new(),
                now(),
                &token,
            )
            .await
            .expect("compose");
        assert_eq!(
            requests[0].body["query"]["bool"]["filter"],
            json!([{"terms": {"application_id": ["app-1"]}}])
        );

        let wildcard = Bindings::new()
            .with(names::APPLICATION, BindingValue::text("All"))
            .with(names::COMPONENT, BindingValue::list(["c-1"]));
        let requests = composer
            .compose(
                &widget,
                vec![query("q", "idx", json!({}))],
                &wildcard,
                &BaseFilters::new(),
                now(),
                &token,
            )
            .await
            .expect("compose");
        assert_eq!(
            requests[0].body["query"]["bool"]["filter"],
            json!([{"terms": {"component_id": ["c-1"]}}])
        );
    }

    #[tokio::test]
    async fn functional_branch_resolution_uses_service_once_per_request() {
        let (composer, branches) = composer();
        let widget = definition(json!({"id": "runs", "title": "Runs"}));
        let bindings = Bindings::new().with(names::BRANCH, BindingValue::text("b-9"));
        let mut named = query("commits", "commits", json!({}));
        named.branch_name_filter = true;

        let requests = composer
            .compose(
                &widget,
                vec![
                    query("runs", "runs", json!({})),
                    query("runs_past", "runs", json!({})),
                    named,
                ],
                &bindings,
                &BaseFilters::new(),
                now(),
                &CooperativeCancellationToken::new(),
            )
            .await
            .expect("compose");

        assert_eq!(
            requests[0].body["query"]["bool"]["filter"],
            json!([{"terms": {"automation_id": ["auto-1", "auto-2"]}}])
        );
        assert_eq!(
            requests[2].body["query"]["bool"]["filter"],
            json!([{"term": {"branch": "main"}}])
        );
        assert_eq!(branches.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unit_should_queries_extend_each_disjunct_must() {
        let mut body = json!({"query": {"bool": {"should": [
            {"bool": {"must": {"term": {"kind": "a"}}}},
            {"term": {"kind": "b"}}
        ]}}});
        inject_clauses("q", &mut body, vec![json!({"terms": {"component_id": ["c"]}})])
            .expect("inject");

        assert_eq!(
            body,
            json!({"query": {"bool": {"should": [
                {"bool": {"must": [{"term": {"kind": "a"}}, {"terms": {"component_id": ["c"]}}]}},
                {"bool": {"must": [{"term": {"kind": "b"}}, {"terms": {"component_id": ["c"]}}]}}
            ]}}})
        );
    }

    #[test]
    fn unit_non_bool_query_is_wrapped_before_filtering() {
        let mut body = json!({"query": {"match_all": {}}, "size": 0});
        inject_clauses("q", &mut body, vec![json!({"term": {"a": 1}})]).expect("inject");
        assert_eq!(
            body["query"],
            json!({"bool": {"must": [{"match_all": {}}], "filter": [{"term": {"a": 1}}]}})
        );
    }

    #[tokio::test]
    async fn functional_breached_sla_bounds_breach_time_by_local_now() {
        let (composer, _) = composer();
        let widget = definition(json!({"id": "f", "title": "F", "accepts": ["sla"]}));
        let token = CooperativeCancellationToken::new();

        let berlin = Bindings::new()
            .with(names::SLA, BindingValue::text("BREACHED_SLA"))
            .with(names::TIME_ZONE, BindingValue::text("Europe/Berlin"));
        let requests = composer
            .compose(
                &widget,
                vec![query("q", "idx", json!({"size": 0}))],
                &berlin,
                &BaseFilters::new(),
                now(),
                &token,
            )
            .await
            .expect("compose");
        assert_eq!(
            requests[0].body["query"]["bool"]["filter"],
            json!([{"range": {"sla_breach_time": {"lte": "2024-03-15T13:00:00+01:00"}}}])
        );

        let default_zone = Bindings::new().with(names::SLA, BindingValue::text("BREACHED_SLA"));
        let requests = composer
            .compose(
                &widget,
                vec![query("q", "idx", json!({"size": 0}))],
                &default_zone,
                &BaseFilters::new(),
                now(),
                &token,
            )
            .await
            .expect("compose");
        assert_eq!(
            requests[0].body["query"]["bool"]["filter"],
            json!([{"range": {"sla_breach_time": {"lte": "2024-03-15T12:00:00+00:00"}}}])
        );
    }

    #[tokio::test]
    async fn regression_unknown_sla_value_is_rejected() {
        let (composer, _) = composer();
        let widget = definition(json!({"id": "f", "title": "F", "accepts": ["sla"]}));
        let bindings = Bindings::new().with(names::SLA, BindingValue::text("SOMETIMES"));
        let error = composer
            .compose(
                &widget,
                vec![query("q", "idx", json!({}))],
                &bindings,
                &BaseFilters::new(),
                now(),
                &CooperativeCancellationToken::new(),
            )
            .await
            .expect_err("bad sla");
        assert_eq!(error.code(), "placeholder_type_mismatch");
    }
}
