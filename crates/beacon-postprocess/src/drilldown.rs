use beacon_types::{names, Bindings, DrillDown};
use serde_json::{Map, Value};

const SCOPE_BINDINGS: [&str; 5] = [
    names::START_DATE,
    names::END_DATE,
    names::COMPONENT,
    names::APPLICATION,
    names::BRANCH,
];

/// Drill-down into a report, scoped by the request window and ids.
///
/// `filter` narrows the report to one category, e.g. `("status", "SUCCESS")`.
pub fn report_drill_down(
    report_id: &str,
    report_title: &str,
    report_type: &str,
    bindings: &Bindings,
    filter: Option<(&str, &str)>,
) -> DrillDown {
    let mut info = Map::new();
    for name in SCOPE_BINDINGS {
        if let Some(value) = bindings.get(name) {
            if let Ok(encoded) = serde_json::to_value(value) {
                info.insert(name.to_string(), encoded);
            }
        }
    }
    if let Some((field, value)) = filter {
        let mut scoped = Map::new();
        scoped.insert(field.to_string(), Value::String(value.to_string()));
        info.insert("filter".to_string(), Value::Object(scoped));
    }

    let drill_down = DrillDown::new(report_id, report_title, report_type);
    if info.is_empty() {
        drill_down
    } else {
        drill_down.with_info(Value::Object(info))
    }
}
