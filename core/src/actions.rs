//! Action dispatch and the per-operation handlers.
//!
//! # Design
//! `Connector` owns the configuration, the transport and the vault. Each
//! action identifier maps to one handler through a fixed table. Handlers
//! write records and summary values through `ResultCollector` and stop at
//! the first failure with `?`; `handle_action` then finalizes the result
//! exactly once. A fresh `TetrationClient` is built for every REST call, so
//! bad URLs or credentials surface as that call's error.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::classify::CallOutcome;
use crate::client::{MultipartOption, RestCall, TetrationClient};
use crate::config::ConnectorConfig;
use crate::endpoints::Operation;
use crate::error::{ConnectorError, ConnectorResult};
use crate::flows::{FlowQuery, FlowTime};
use crate::http::{Transport, UreqTransport};
use crate::normalize::normalize;
use crate::params::{self, Params};
use crate::result::{ActionResult, FinishedAction, ResultCollector};
use crate::vault::{resolve_annotation_file, LocalVault, Vault};

pub const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(15);
pub const CONNECTION_TEST_MSG: &str = "Querying endpoint to verify the credentials provided";
pub const TEST_CONNECTIVITY_PASS: &str = "Test Connectivity passed";
pub const TEST_CONNECTIVITY_FAIL: &str = "Test connectivity failed";
pub const NO_ANNOTATIONS_FOUND: &str = "No annotations found to flush";
pub const ANNOTATIONS_FLUSHED: &str = "Annotations flushed successfully";

/// Multipart field carrying the annotation operation.
pub const OPERATION_FIELD: &str = "X-Tetration-Oper";

/// Actions the connector implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TestAssetConnectivity,
    GetFlows,
    ListEndpoints,
    ListScopes,
    LookupIp,
    ListUserGroups,
    ListAnnotations,
    FlushAnnotations,
    UploadAnnotations,
    ListDimensions,
    ListMetrics,
}

const ACTION_TABLE: &[(&str, Action)] = &[
    ("test_asset_connectivity", Action::TestAssetConnectivity),
    ("get_flows", Action::GetFlows),
    ("list_endpoints", Action::ListEndpoints),
    ("list_scopes", Action::ListScopes),
    ("lookup_ip", Action::LookupIp),
    ("list_user_groups", Action::ListUserGroups),
    ("list_annotations", Action::ListAnnotations),
    ("flush_annotations", Action::FlushAnnotations),
    ("upload_annotations", Action::UploadAnnotations),
    ("list_dimensions", Action::ListDimensions),
    ("list_metrics", Action::ListMetrics),
];

impl Action {
    pub fn all() -> impl Iterator<Item = Action> {
        ACTION_TABLE.iter().map(|(_, action)| *action)
    }

    pub fn identifier(self) -> &'static str {
        ACTION_TABLE
            .iter()
            .find(|(_, action)| *action == self)
            .map(|(id, _)| *id)
            .unwrap_or("unknown")
    }

    /// Human-readable name the views are keyed by.
    pub fn display_name(self) -> &'static str {
        match self {
            Action::TestAssetConnectivity => "test connectivity",
            Action::GetFlows => "get flows",
            Action::ListEndpoints => "list endpoints",
            Action::ListScopes => "list scopes",
            Action::LookupIp => "lookup ip",
            Action::ListUserGroups => "list user groups",
            Action::ListAnnotations => "list annotations",
            Action::FlushAnnotations => "flush annotations",
            Action::UploadAnnotations => "upload annotations",
            Action::ListDimensions => "list dimensions",
            Action::ListMetrics => "list metrics",
        }
    }
}

impl FromStr for Action {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ACTION_TABLE
            .iter()
            .find(|(id, _)| *id == s)
            .map(|(_, action)| *action)
            .ok_or_else(|| ConnectorError::UnsupportedAction(s.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Handler outcome: an optional success message, or the terminal error.
pub type HandlerResult = ConnectorResult<Option<String>>;

pub struct Connector<T = UreqTransport> {
    config: ConnectorConfig,
    transport: T,
    vault: Box<dyn Vault>,
}

impl Connector<UreqTransport> {
    pub fn new(config: ConnectorConfig) -> Self {
        let transport = UreqTransport::new(config.verify_server_cert);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Connector<T> {
    pub fn with_transport(config: ConnectorConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            vault: Box::new(LocalVault::new()),
        }
    }

    pub fn with_vault(mut self, vault: impl Vault + 'static) -> Self {
        self.vault = Box::new(vault);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the action named `action_id` with `param` and finalize its result.
    pub fn handle_action(&self, action_id: &str, param: Map<String, Value>) -> FinishedAction {
        let mut result = ActionResult::new(param.clone());
        let outcome = action_id
            .parse::<Action>()
            .and_then(|action| self.run(action, Params::new(&param), &mut result));

        let finished = result.finish(outcome);
        if finished.is_success() {
            info!(action = action_id, records = finished.data().len(), "action succeeded");
        } else {
            warn!(action = action_id, error = finished.message().unwrap_or(""), "action failed");
        }
        finished
    }

    pub fn run(
        &self,
        action: Action,
        params: Params<'_>,
        collector: &mut dyn ResultCollector,
    ) -> HandlerResult {
        match action {
            Action::TestAssetConnectivity => self.test_asset_connectivity(collector),
            Action::GetFlows => self.get_flows(params, collector),
            Action::ListEndpoints => self.list_endpoints(collector),
            Action::ListScopes => self.list_scopes(collector),
            Action::LookupIp => self.lookup_ip(params, collector),
            Action::ListUserGroups => self.list_user_groups(collector),
            Action::ListAnnotations => self.list_annotations(params, collector),
            Action::FlushAnnotations => self.flush_annotations(params, collector),
            Action::UploadAnnotations => self.upload_annotations(params, collector),
            Action::ListDimensions => {
                self.list_names(Operation::ListDimensions, "dimension_name", "total_dimensions", collector)
            }
            Action::ListMetrics => {
                self.list_names(Operation::ListMetrics, "metric_name", "total_metrics", collector)
            }
        }
    }

    fn rest(&self, call: RestCall, collector: &mut dyn ResultCollector) -> CallOutcome {
        let client = TetrationClient::with_transport(&self.config, &self.transport)?;
        client.call(call, collector)
    }

    fn test_asset_connectivity(&self, collector: &mut dyn ResultCollector) -> HandlerResult {
        info!("{CONNECTION_TEST_MSG}");
        let probe = RestCall::connectivity_probe(Operation::ListDimensions.path(), CONNECTIVITY_TIMEOUT);
        match self.rest(probe, collector) {
            Ok(_) => Ok(Some(TEST_CONNECTIVITY_PASS.to_string())),
            Err(err) => {
                warn!(error = %err, "{TEST_CONNECTIVITY_FAIL}");
                Err(err)
            }
        }
    }

    fn list_endpoints(&self, collector: &mut dyn ResultCollector) -> HandlerResult {
        let response = self.rest(RestCall::get(Operation::ListSensors.path()), collector)?;
        for sensor in results(response) {
            collector.add_data(sensor);
        }
        let total = collector.data_len();
        collector.set_summary("total_endpoints", json!(total));
        Ok(None)
    }

    fn get_flows(&self, params: Params<'_>, collector: &mut dyn ResultCollector) -> HandlerResult {
        let start_time = params.required(params::START_TIME)?.to_uppercase();
        let end_time = params.required(params::END_TIME)?.to_uppercase();
        let limit = params.limit()?;
        let filter = params.filter()?;

        let mut query = FlowQuery::new(FlowTime::Text(start_time), FlowTime::Text(end_time), limit, filter);
        query.scope_name = params.optional(params::SCOPE_NAME);
        query.dimensions = params.list(params::DIMENSIONS);
        query.metrics = params.list(params::METRICS);

        let call = RestCall::post(Operation::FlowSearch.path()).with_json(query.to_body());
        let response = self.rest(call, collector)?;
        for flow in results(response) {
            collector.add_data(flow);
        }
        let total = collector.data_len();
        collector.set_summary("total_flows", json!(total));
        Ok(None)
    }

    fn lookup_ip(&self, params: Params<'_>, collector: &mut dyn ResultCollector) -> HandlerResult {
        let ip = params.ip()?;

        let sensors = self.rest(RestCall::get(Operation::ListSensors.path()), collector)?;
        let endpoints: Vec<Value> = results(sensors)
            .into_iter()
            .filter(|sensor| has_interface_ip(sensor, &ip))
            .collect();

        let address = ip.as_str();
        let query = FlowQuery::recent(Utc::now(), &[("src_address", address), ("dst_address", address)]);
        let call = RestCall::post(Operation::FlowSearch.path()).with_json(query.to_body());
        let flows = results(self.rest(call, collector)?);

        let total_endpoints = endpoints.len();
        let total_flows = flows.len();
        collector.add_data(json!({"endpoints": endpoints, "flow": flows}));
        collector.set_summary("total_endpoints", json!(total_endpoints));
        collector.set_summary("total_flows", json!(total_flows));
        Ok(None)
    }

    fn list_user_groups(&self, collector: &mut dyn ResultCollector) -> HandlerResult {
        let roles = self.rest(RestCall::get(Operation::ListUserRoles.path()), collector)?;
        let users = self.rest(RestCall::get(Operation::ListUsers.path()), collector)?;

        let mut roles = into_list(roles);
        for user in into_list(users) {
            let role_ids = user
                .get("role_ids")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for role_id in &role_ids {
                for role in roles.iter_mut() {
                    if role.get("id") == Some(role_id) {
                        add_member(role, user.clone());
                    }
                }
            }
        }

        for role in roles {
            collector.add_data(role);
        }
        let total = collector.data_len();
        collector.set_summary("total_roles", json!(total));
        Ok(None)
    }

    fn list_annotations(&self, params: Params<'_>, collector: &mut dyn ResultCollector) -> HandlerResult {
        let scope_name = params.required(params::SCOPE_NAME)?;
        let call = RestCall::get(Operation::ListAnnotations.scoped_path(&scope_name));
        for name in into_list(self.rest(call, collector)?) {
            collector.add_data(json!({"annotation_name": name}));
        }
        let total = collector.data_len();
        collector.set_summary("total_annotations", json!(total));
        Ok(None)
    }

    fn flush_annotations(&self, params: Params<'_>, collector: &mut dyn ResultCollector) -> HandlerResult {
        let scope_name = params.required(params::SCOPE_NAME)?;
        let listing = RestCall::get(Operation::ListAnnotations.scoped_path(&scope_name));
        let existing = self.rest(listing, collector)?;

        if !has_entries(&existing) {
            return Ok(Some(NO_ANNOTATIONS_FOUND.to_string()));
        }
        let flush = RestCall::new(
            Operation::FlushAnnotations.scoped_path(&scope_name),
            Operation::FlushAnnotations.method(),
        );
        self.rest(flush, collector)?;
        Ok(Some(ANNOTATIONS_FLUSHED.to_string()))
    }

    fn upload_annotations(&self, params: Params<'_>, collector: &mut dyn ResultCollector) -> HandlerResult {
        let scope_name = params.required(params::SCOPE_NAME)?;
        let operation = params.required(params::OPERATION)?.to_lowercase();
        let vault_id = params.optional(params::VAULT_ID);
        let filename = params.optional(params::FILE_NAME);

        let file_path = resolve_annotation_file(&*self.vault, vault_id.as_deref(), filename.as_deref())?;

        let call = RestCall::upload(
            Operation::UploadAnnotations.scoped_path(&scope_name),
            &file_path,
            vec![MultipartOption::new(OPERATION_FIELD, operation)],
        );
        let response = self.rest(call, collector)?;

        let warnings = response.get("warnings").cloned().unwrap_or(Value::Null);
        collector.add_data(response);
        collector.set_summary("warnings", warnings);
        Ok(None)
    }

    /// Bare-list endpoints whose items are wrapped as `{field: item}`.
    fn list_names(
        &self,
        operation: Operation,
        field: &str,
        summary_key: &str,
        collector: &mut dyn ResultCollector,
    ) -> HandlerResult {
        let response = self.rest(RestCall::get(operation.path()), collector)?;
        for name in into_list(response) {
            let mut record = Map::new();
            record.insert(field.to_string(), name);
            collector.add_data(Value::Object(record));
        }
        let total = collector.data_len();
        collector.set_summary(summary_key, json!(total));
        Ok(None)
    }

    fn list_scopes(&self, collector: &mut dyn ResultCollector) -> HandlerResult {
        let response = self.rest(RestCall::get(Operation::ListScopes.path()), collector)?;
        for scope in into_list(response) {
            collector.add_data(normalize(scope));
        }
        let total = collector.data_len();
        collector.set_summary("total_scopes", json!(total));
        Ok(None)
    }
}

/// Records of a `{"results": [...]}` envelope; empty when absent.
fn results(response: Value) -> Vec<Value> {
    match response {
        Value::Object(mut envelope) => match envelope.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Items of a bare-list response; anything else has none.
fn into_list(response: Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

fn has_entries(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

fn has_interface_ip(sensor: &Value, ip: &str) -> bool {
    sensor
        .get("interfaces")
        .and_then(Value::as_array)
        .is_some_and(|interfaces| {
            interfaces
                .iter()
                .any(|interface| interface.get(params::IP).and_then(Value::as_str) == Some(ip))
        })
}

fn add_member(role: &mut Value, user: Value) {
    let Value::Object(fields) = role else {
        return;
    };
    let members = fields
        .entry("users")
        .or_insert_with(|| Value::Array(Vec::new()));
    match members {
        Value::Array(list) => list.push(user),
        other => *other = Value::Array(vec![user]),
    }
}
