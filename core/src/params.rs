//! Action parameter extraction and validation.
//!
//! Parameters arrive as a JSON object from the automation platform. Strings
//! are the norm but numbers are tolerated where a string is expected, and an
//! empty string counts as absent for optional parameters.

use std::net::IpAddr;

use serde_json::{Map, Value};

use crate::error::{ConnectorError, ConnectorResult};

pub const LIMIT_ERROR: &str = "Parameter limit must be a positive integer";
pub const JSON_LOADS_ERROR: &str = "Error while converting string to dictionary";
pub const INVALID_IP_ERROR: &str = "Parameter 'ip' is not a valid IP address";

pub const START_TIME: &str = "start_time";
pub const END_TIME: &str = "end_time";
pub const FILTER: &str = "filter";
pub const SCOPE_NAME: &str = "scope_name";
pub const DIMENSIONS: &str = "dimensions";
pub const METRICS: &str = "metrics";
pub const LIMIT: &str = "limit";
pub const VAULT_ID: &str = "vault_id";
pub const FILE_NAME: &str = "filename";
pub const OPERATION: &str = "operation";
pub const IP: &str = "ip";

/// Limit used when the caller gives none.
pub const DEFAULT_LIMIT: &str = "100";

#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.map.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn required(&self, name: &str) -> ConnectorResult<String> {
        self.optional(name).ok_or_else(|| {
            ConnectorError::validation(format!("Missing required parameter '{name}'"))
        })
    }

    pub fn optional(&self, name: &str) -> Option<String> {
        self.text(name).filter(|s| !s.is_empty())
    }

    /// Positive integer limit, defaulting to 100.
    pub fn limit(&self) -> ConnectorResult<u64> {
        let raw = self.text(LIMIT).unwrap_or_else(|| DEFAULT_LIMIT.to_string());
        parse_limit(&raw)
    }

    /// Flow filter given as a JSON string; an empty object when absent.
    pub fn filter(&self) -> ConnectorResult<Value> {
        match self.map.get(FILTER) {
            None | Some(Value::Null) => Ok(Value::Object(Map::new())),
            Some(Value::String(s)) if s.is_empty() => Ok(Value::Object(Map::new())),
            Some(Value::String(s)) => {
                serde_json::from_str(s).map_err(|_| ConnectorError::validation(JSON_LOADS_ERROR))
            }
            Some(other) => Ok(other.clone()),
        }
    }

    /// Comma-separated list with blanks removed; `None` when empty.
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        self.optional(name)
            .map(|raw| split_list(&raw))
            .filter(|items| !items.is_empty())
    }

    pub fn ip(&self) -> ConnectorResult<String> {
        let raw = self.required(IP)?;
        raw.trim()
            .parse::<IpAddr>()
            .map(|_| raw.trim().to_string())
            .map_err(|_| ConnectorError::validation(INVALID_IP_ERROR))
    }
}

pub fn parse_limit(raw: &str) -> ConnectorResult<u64> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConnectorError::validation(LIMIT_ERROR));
    }
    match raw.parse::<u64>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(ConnectorError::validation(LIMIT_ERROR)),
    }
}

/// `"a, b,,c "` -> `["a", "b", "c"]`
pub fn split_list(raw: &str) -> Vec<String> {
    raw.replace(' ', "")
        .split(',')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
