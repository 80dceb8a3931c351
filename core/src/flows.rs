//! Flow search request bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// Time window the IP lookup searches, ending now.
pub const LOOKUP_WINDOW_SECS: i64 = 86_400;
pub const LOOKUP_LIMIT: u64 = 100;

/// Window bound: an appliance-formatted timestamp or epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FlowTime {
    Text(String),
    Epoch(i64),
}

/// Body of a flow search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowQuery {
    pub t0: FlowTime,
    pub t1: FlowTime,
    pub limit: u64,
    pub filter: Value,
    #[serde(rename = "scopeName", skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<String>>,
}

impl FlowQuery {
    pub fn new(t0: FlowTime, t1: FlowTime, limit: u64, filter: Value) -> Self {
        Self {
            t0,
            t1,
            limit,
            filter,
            scope_name: None,
            dimensions: None,
            metrics: None,
        }
    }

    /// Flows of the last 24 hours matching any of `fields`.
    pub fn recent(now: DateTime<Utc>, fields: &[(&str, &str)]) -> Self {
        let t1 = now.timestamp();
        Self::new(
            FlowTime::Epoch(t1 - LOOKUP_WINDOW_SECS),
            FlowTime::Epoch(t1),
            LOOKUP_LIMIT,
            any_equal(fields),
        )
    }

    pub fn to_body(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// `or` filter of one `eq` clause per `(field, value)` pair, in order.
pub fn any_equal(fields: &[(&str, &str)]) -> Value {
    let filters: Vec<Value> = fields
        .iter()
        .map(|(field, value)| json!({"type": "eq", "field": field, "value": value}))
        .collect();
    json!({"type": "or", "filters": filters})
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn address_filter_matches_source_or_destination() {
        assert_eq!(
            any_equal(&[("src_address", "10.0.0.1"), ("dst_address", "10.0.0.1")]),
            json!({
                "type": "or",
                "filters": [
                    {"type": "eq", "field": "src_address", "value": "10.0.0.1"},
                    {"type": "eq", "field": "dst_address", "value": "10.0.0.1"}
                ]
            })
        );
    }

    #[test]
    fn recent_window_spans_one_day() {
        let now = Utc.with_ymd_and_hms(2018, 5, 1, 0, 0, 0).unwrap();
        let body = FlowQuery::recent(now, &[("src_address", "1.2.3.4")]).to_body();
        assert_eq!(body["t1"], now.timestamp());
        assert_eq!(body["t0"], now.timestamp() - 86_400);
        assert_eq!(body["limit"], 100);
        assert!(body.get("scopeName").is_none());
    }

    #[test]
    fn optional_fields_serialize_when_present() {
        let mut query = FlowQuery::new(
            FlowTime::Text("2018-05-01T00:00:00Z".to_string()),
            FlowTime::Text("2018-05-02T00:00:00Z".to_string()),
            50,
            json!({}),
        );
        query.scope_name = Some("Default".to_string());
        query.dimensions = Some(vec!["src_address".to_string()]);
        let body = query.to_body();
        assert_eq!(body["t0"], "2018-05-01T00:00:00Z");
        assert_eq!(body["limit"], 50);
        assert_eq!(body["scopeName"], "Default");
        assert_eq!(body["dimensions"], json!(["src_address"]));
        assert!(body.get("metrics").is_none());
    }
}
