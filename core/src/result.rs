//! Per-invocation result bookkeeping.
//!
//! # Design
//! `ActionResult` is the mutable accumulator a handler fills in through the
//! `ResultCollector` trait. Finalizing consumes it and yields a
//! `FinishedAction`, so the terminal status is set exactly once and nothing
//! can be appended afterwards.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ConnectorError;

/// Sink for everything a handler produces while it runs.
pub trait ResultCollector {
    fn add_data(&mut self, record: Value);

    fn data_len(&self) -> usize;

    fn set_summary(&mut self, key: &str, value: Value);

    /// Troubleshooting data; never read back by handlers.
    fn add_debug_data(&mut self, entry: Value);
}

/// Accumulator for one action invocation.
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    param: Map<String, Value>,
    data: Vec<Value>,
    summary: Map<String, Value>,
    debug_data: Vec<Value>,
}

impl ActionResult {
    pub fn new(param: Map<String, Value>) -> Self {
        Self {
            param,
            ..Self::default()
        }
    }

    pub fn param(&self) -> &Map<String, Value> {
        &self.param
    }

    pub fn data(&self) -> &[Value] {
        &self.data
    }

    pub fn summary(&self) -> &Map<String, Value> {
        &self.summary
    }

    pub fn debug_data(&self) -> &[Value] {
        &self.debug_data
    }

    pub fn succeed(self, message: Option<String>) -> FinishedAction {
        self.finalize(ActionStatus::Success, message, None)
    }

    pub fn fail(self, error: ConnectorError) -> FinishedAction {
        let message = error.to_string();
        self.finalize(ActionStatus::Failed, Some(message), Some(error))
    }

    /// Finalize from a handler's outcome.
    pub fn finish(self, outcome: Result<Option<String>, ConnectorError>) -> FinishedAction {
        match outcome {
            Ok(message) => self.succeed(message),
            Err(error) => self.fail(error),
        }
    }

    fn finalize(
        self,
        status: ActionStatus,
        message: Option<String>,
        error: Option<ConnectorError>,
    ) -> FinishedAction {
        FinishedAction {
            status,
            message,
            param: self.param,
            data: self.data,
            summary: self.summary,
            debug_data: self.debug_data,
            error,
        }
    }
}

impl ResultCollector for ActionResult {
    fn add_data(&mut self, record: Value) {
        self.data.push(record);
    }

    fn data_len(&self) -> usize {
        self.data.len()
    }

    fn set_summary(&mut self, key: &str, value: Value) {
        self.summary.insert(key.to_string(), value);
    }

    fn add_debug_data(&mut self, entry: Value) {
        self.debug_data.push(entry);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// Immutable outcome of one action invocation.
#[derive(Debug, Clone, Serialize)]
pub struct FinishedAction {
    status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(rename = "parameter")]
    param: Map<String, Value>,
    data: Vec<Value>,
    summary: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    debug_data: Vec<Value>,
    #[serde(skip)]
    error: Option<ConnectorError>,
}

impl FinishedAction {
    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&ConnectorError> {
        self.error.as_ref()
    }

    pub fn param(&self) -> &Map<String, Value> {
        &self.param
    }

    pub fn data(&self) -> &[Value] {
        &self.data
    }

    pub fn summary(&self) -> &Map<String, Value> {
        &self.summary
    }

    pub fn debug_data(&self) -> &[Value] {
        &self.debug_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn succeed_keeps_accumulated_parts() {
        let mut param = Map::new();
        param.insert("scope_name".to_string(), json!("Default"));
        let mut result = ActionResult::new(param);
        result.add_data(json!({"annotation_name": "owner"}));
        result.set_summary("total_annotations", json!(1));

        let finished = result.succeed(None);
        assert!(finished.is_success());
        assert_eq!(finished.data().len(), 1);
        assert_eq!(finished.summary()["total_annotations"], 1);
        assert_eq!(finished.param()["scope_name"], "Default");
        assert!(finished.message().is_none());
    }

    #[test]
    fn fail_records_error_message() {
        let mut result = ActionResult::default();
        result.add_data(json!({"a": 1}));
        let finished = result.fail(ConnectorError::EmptyResponse);

        assert_eq!(finished.status(), ActionStatus::Failed);
        assert_eq!(
            finished.message(),
            Some("Empty response and no information in the header")
        );
        assert_eq!(finished.error(), Some(&ConnectorError::EmptyResponse));
        assert_eq!(finished.data().len(), 1);
    }

    #[test]
    fn finish_maps_handler_outcome() {
        let ok = ActionResult::default().finish(Ok(Some("done".to_string())));
        assert!(ok.is_success());
        assert_eq!(ok.message(), Some("done"));

        let err = ActionResult::default().finish(Err(ConnectorError::validation("bad")));
        assert!(!err.is_success());
        assert_eq!(err.message(), Some("bad"));
    }

    #[test]
    fn finished_action_serializes_for_output() {
        let mut result = ActionResult::default();
        result.add_debug_data(json!({"r_status_code": 200}));
        let value = serde_json::to_value(result.succeed(None)).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["debug_data"][0]["r_status_code"], 200);
        assert!(value.get("message").is_none());
        assert!(value.get("error").is_none());
    }
}
