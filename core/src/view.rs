//! Context shaping for the summary views of finished actions.
//!
//! Rendering is left to the host; this module only produces the data each
//! page is fed and picks the page name.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::actions::Action;
use crate::result::FinishedAction;

const FLOW_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const DISPLAY_FORMAT: &str = "%b %d %I:%M:%S %p";

/// A flow column and the contextual type its cells carry, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub contains: Option<&'static str>,
}

const fn column(name: &'static str, contains: Option<&'static str>) -> Column {
    Column { name, contains }
}

/// Flow columns in display order.
pub const FLOW_COLUMNS: &[Column] = &[
    column("timestamp", None),
    column("src_hostname", Some("host name")),
    column("dst_hostname", Some("host name")),
    column("src_address", Some("ip")),
    column("dst_address", Some("ip")),
    column("src_port", Some("port")),
    column("dst_port", Some("port")),
    column("proto", None),
    column("start_timestamp", None),
    column("src_scope_name", Some("cisco ta scope")),
    column("dst_scope_name", Some("cisco ta scope")),
    column("vrf_name", None),
    column("srtt_usec", None),
    column("total_network_latency_usec", None),
    column("server_app_latency_usec", None),
    column("fwd_pkts", None),
    column("rev_pkts", None),
    column("fwd_bytes", None),
    column("rev_bytes", None),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewContext {
    pub param: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Map<String, Value>>,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<Column>>,
}

pub fn context_for(action: Action, result: &FinishedAction) -> ViewContext {
    let summary = Some(result.summary().clone()).filter(|s| !s.is_empty());
    let mut context = ViewContext {
        param: result.param().clone(),
        summary,
        data: Value::Object(Map::new()),
        action: None,
        columns: None,
    };

    let data = result.data();
    if data.is_empty() {
        return context;
    }

    context.action = Some(action.display_name());
    context.data = match action {
        Action::LookupIp => lookup_ip_data(&data[0]),
        Action::GetFlows => Value::Array(data.iter().cloned().map(display_flow).collect()),
        _ => Value::Array(data.to_vec()),
    };
    if action == Action::GetFlows {
        context.columns = Some(columns_present(data));
    }
    context
}

/// Contexts for every result of a run, plus the page they render into.
pub fn display_view(action: Action, results: &[FinishedAction]) -> (Vec<ViewContext>, &'static str) {
    let contexts = results.iter().map(|r| context_for(action, r)).collect();
    (contexts, template_for(action))
}

pub fn template_for(action: Action) -> &'static str {
    match action {
        Action::GetFlows => "ciscota_display_flows.html",
        Action::LookupIp => "ciscota_lookup_ip.html",
        Action::ListUserGroups => "ciscota_display_user_group.html",
        Action::ListAnnotations => "ciscota_display_annotations.html",
        Action::ListDimensions => "ciscota_display_dimensions.html",
        Action::ListMetrics => "ciscota_display_metrics.html",
        Action::ListScopes => "ciscota_display_scopes.html",
        _ => "ciscota_display_vms.html",
    }
}

fn lookup_ip_data(record: &Value) -> Value {
    let mut record = record.clone();
    if let Some(Value::Array(flows)) = record.get_mut("flow") {
        for flow in flows.iter_mut() {
            listify_scope_names(flow);
        }
    }
    record
}

fn display_flow(mut flow: Value) -> Value {
    if let Some(fields) = flow.as_object_mut() {
        if let Some(shown) = fields.get("timestamp").and_then(format_flow_timestamp) {
            fields.insert("timestamp".to_string(), Value::String(shown));
        }
        if let Some(shown) = fields.get("start_timestamp").and_then(format_epoch_millis) {
            fields.insert("start_timestamp".to_string(), Value::String(shown));
        }
    }
    listify_scope_names(&mut flow);
    flow
}

fn listify_scope_names(flow: &mut Value) {
    let Some(fields) = flow.as_object_mut() else {
        return;
    };
    for key in ["src_scope_name", "dst_scope_name"] {
        if let Some(value) = fields.get_mut(key) {
            if value.is_string() {
                *value = Value::Array(vec![value.take()]);
            }
        }
    }
}

fn format_flow_timestamp(value: &Value) -> Option<String> {
    let raw = value.as_str()?;
    let parsed = NaiveDateTime::parse_from_str(raw, FLOW_TIMESTAMP_FORMAT).ok()?;
    Some(parsed.format(DISPLAY_FORMAT).to_string())
}

fn format_epoch_millis(value: &Value) -> Option<String> {
    let millis = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if millis == 0 {
        return None;
    }
    let moment: DateTime<Utc> = DateTime::from_timestamp_millis(millis)?;
    Some(moment.format(DISPLAY_FORMAT).to_string())
}

fn columns_present(data: &[Value]) -> Vec<Column> {
    FLOW_COLUMNS
        .iter()
        .filter(|col| {
            data.iter()
                .any(|record| record.get(col.name).is_some())
        })
        .copied()
        .collect()
}
