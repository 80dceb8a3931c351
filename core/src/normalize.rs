//! Display normalization of JSON values.
//!
//! Some appliance fields arrive as a number in one record and as a string in
//! the next. Table views choke on mixed-type columns, so numbers are rendered
//! to strings before records are surfaced.

use serde_json::{Map, Value};

/// Rewrite every number in `value` to its string form, depth-first.
///
/// Booleans, strings and nulls are left untouched; the shape is preserved.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_become_strings() {
        assert_eq!(normalize(json!(42)), json!("42"));
        assert_eq!(normalize(json!(-7)), json!("-7"));
        assert_eq!(normalize(json!(1.5)), json!("1.5"));
    }

    #[test]
    fn booleans_and_null_are_untouched() {
        assert_eq!(normalize(json!(true)), json!(true));
        assert_eq!(normalize(json!(false)), json!(false));
        assert_eq!(normalize(Value::Null), Value::Null);
    }

    #[test]
    fn nested_scope_record_is_normalized() {
        let scope = json!({
            "id": "5a1f",
            "vrf_id": 1,
            "dirty": false,
            "short_priority": 12,
            "query": {"type": "eq", "field": "vrf_id", "value": 1},
            "child_app_scope_ids": [3, "4"],
            "description": null
        });
        assert_eq!(
            normalize(scope),
            json!({
                "id": "5a1f",
                "vrf_id": "1",
                "dirty": false,
                "short_priority": "12",
                "query": {"type": "eq", "field": "vrf_id", "value": "1"},
                "child_app_scope_ids": ["3", "4"],
                "description": null
            })
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let value = json!({"a": [1, 2.25, {"b": true, "c": [0]}], "d": "x"});
        let once = normalize(value);
        assert_eq!(normalize(once.clone()), once);
    }

    #[test]
    fn values_without_numbers_are_unchanged() {
        let value = json!({"name": "Default", "tags": ["a", null, false], "nested": {}});
        assert_eq!(normalize(value.clone()), value);
    }
}
