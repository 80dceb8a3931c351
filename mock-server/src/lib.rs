//! In-memory mock of the appliance open API used by integration tests.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Headers every signed request carries.
pub const REQUIRED_HEADERS: &[&str] = &["id", "timestamp", "authorization"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interface {
    pub ip: String,
    pub vrf: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sensor {
    pub uuid: Uuid,
    pub host_name: String,
    pub interfaces: Vec<Interface>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlowSearch {
    #[serde(default)]
    pub t0: Value,
    #[serde(default)]
    pub t1: Value,
    #[serde(default)]
    pub filter: Value,
    pub limit: Option<usize>,
    #[serde(rename = "scopeName")]
    pub scope_name: Option<String>,
}

/// Appliance state served by the mock.
#[derive(Debug, Default)]
pub struct Appliance {
    pub sensors: Vec<Sensor>,
    pub flows: Vec<Value>,
    pub scopes: Vec<Value>,
    pub annotations: HashMap<String, Vec<String>>,
    pub roles: Vec<Role>,
    pub users: Vec<User>,
}

impl Appliance {
    /// Fixture data: two sensors, a handful of flows, one `Default` scope.
    pub fn seeded() -> Self {
        let sensor = |host: &str, ip: &str| Sensor {
            uuid: Uuid::new_v4(),
            host_name: host.to_string(),
            interfaces: vec![Interface {
                ip: ip.to_string(),
                vrf: "Default".to_string(),
            }],
        };
        let flow = |src: &str, dst: &str, port: u16| {
            json!({
                "timestamp": "2018-05-01T13:04:05.000Z",
                "start_timestamp": 1525179845000_i64,
                "src_address": src,
                "dst_address": dst,
                "dst_port": port,
                "proto": "TCP",
                "src_scope_name": "Default",
                "dst_scope_name": "Default",
                "fwd_pkts": 12,
            })
        };
        let role = |id: &str, name: &str| Role {
            id: id.to_string(),
            name: name.to_string(),
        };
        let user = |id: &str, email: &str, roles: &[&str]| User {
            id: id.to_string(),
            email: email.to_string(),
            role_ids: roles.iter().map(|r| r.to_string()).collect(),
        };

        Self {
            sensors: vec![sensor("web-1", "10.0.0.1"), sensor("db-1", "10.0.0.2")],
            flows: vec![
                flow("10.0.0.1", "10.0.0.2", 5432),
                flow("10.0.0.3", "10.0.0.1", 443),
                flow("10.0.0.3", "10.0.0.4", 22),
            ],
            scopes: vec![json!({
                "id": "5ae0a8ec497d4f1f5a0f6b8e",
                "name": "Default",
                "vrf_id": 1,
                "dirty": false,
                "query": {"type": "eq", "field": "vrf_id", "value": 1},
            })],
            annotations: HashMap::from([("Default".to_string(), Vec::new())]),
            roles: vec![role("r1", "Admins"), role("r2", "Readers")],
            users: vec![
                user("u1", "alice@example.com", &["r1", "r2"]),
                user("u2", "bob@example.com", &["r2"]),
            ],
        }
    }
}

pub type Db = Arc<RwLock<Appliance>>;

pub fn app() -> Router {
    app_with(Appliance::seeded())
}

pub fn app_with(appliance: Appliance) -> Router {
    let db: Db = Arc::new(RwLock::new(appliance));
    let api = Router::new()
        .route("/flowsearch/dimensions", get(list_dimensions))
        .route("/flowsearch/metrics", get(list_metrics))
        .route("/flowsearch", post(flow_search))
        .route("/app_scopes", get(list_scopes))
        .route("/sensors", get(list_sensors))
        .route("/assets/cmdb/annotations/{scope_name}", get(list_annotations))
        .route("/assets/cmdb/upload/{scope_name}", post(upload_annotations))
        .route("/assets/cmdb/flush/{scope_name}", post(flush_annotations))
        .route("/roles", get(list_roles))
        .route("/users", get(list_users))
        .layer(middleware::from_fn(require_signature));

    Router::new()
        .nest("/openapi/v1", api)
        .fallback(not_found)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn require_signature(request: Request, next: Next) -> Response {
    let missing = REQUIRED_HEADERS
        .iter()
        .find(|name| !request.headers().contains_key(**name));
    if let Some(name) = missing {
        return api_error(StatusCode::FORBIDDEN, &format!("missing {name} header"));
    }
    next.run(request).await
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Html("<html><head><title>404</title></head><body><h1>Not Found</h1></body></html>"),
    )
        .into_response()
}

async fn list_dimensions() -> Json<Vec<&'static str>> {
    Json(vec!["src_address", "dst_address", "dst_port", "proto"])
}

async fn list_metrics() -> Json<Vec<&'static str>> {
    Json(vec!["fwd_pkts", "rev_pkts", "fwd_bytes", "rev_bytes"])
}

async fn flow_search(State(db): State<Db>, Json(query): Json<FlowSearch>) -> Response {
    if query.t0.is_null() || query.t1.is_null() {
        return api_error(StatusCode::BAD_REQUEST, "t0 and t1 are required");
    }
    let appliance = db.read().await;
    if let Some(scope) = &query.scope_name {
        if !appliance.annotations.contains_key(scope) {
            return api_error(StatusCode::BAD_REQUEST, "unknown scope");
        }
    }
    let results: Vec<Value> = appliance
        .flows
        .iter()
        .filter(|flow| matches_filter(&query.filter, flow))
        .take(query.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    Json(json!({ "results": results })).into_response()
}

/// Evaluate the `eq`/`and`/`or` subset of the flow filter language.
pub fn matches_filter(filter: &Value, flow: &Value) -> bool {
    let kind = filter.get("type").and_then(Value::as_str);
    let clauses = || {
        filter
            .get("filters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };
    match kind {
        Some("eq") => {
            let field = filter.get("field").and_then(Value::as_str).unwrap_or("");
            flow.get(field) == filter.get("value")
        }
        Some("or") => clauses().iter().any(|f| matches_filter(f, flow)),
        Some("and") => clauses().iter().all(|f| matches_filter(f, flow)),
        _ => true,
    }
}

async fn list_scopes(State(db): State<Db>) -> Json<Vec<Value>> {
    Json(db.read().await.scopes.clone())
}

async fn list_sensors(State(db): State<Db>) -> Json<Value> {
    Json(json!({ "results": db.read().await.sensors }))
}

async fn list_annotations(State(db): State<Db>, Path(scope_name): Path<String>) -> Response {
    match db.read().await.annotations.get(&scope_name) {
        Some(names) => Json(names.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Scope not found"),
    }
}

async fn upload_annotations(
    State(db): State<Db>,
    Path(scope_name): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let mut operation = None;
    let mut csv = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return api_error(StatusCode::BAD_REQUEST, &err.body_text()),
        };
        let name = field.name().unwrap_or_default().to_string();
        let Ok(text) = field.text().await else {
            return api_error(StatusCode::BAD_REQUEST, "unreadable multipart field");
        };
        match name.as_str() {
            "X-Tetration-Oper" => operation = Some(text),
            "file" => csv = Some(text),
            _ => {}
        }
    }

    let (Some(operation), Some(csv)) = (operation, csv) else {
        return api_error(StatusCode::BAD_REQUEST, "operation and file are required");
    };
    let mut appliance = db.write().await;
    let Some(existing) = appliance.annotations.get_mut(&scope_name) else {
        return api_error(StatusCode::NOT_FOUND, "Scope not found");
    };

    let header = csv.lines().next().unwrap_or_default();
    let columns: Vec<String> = header
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && c != "IP" && c != "VRF")
        .collect();
    let mut warnings = Vec::new();
    if csv.lines().skip(1).all(|line| line.trim().is_empty()) {
        warnings.push("file has no data rows".to_string());
    }

    match operation.as_str() {
        "add" | "overwrite" => {
            for column in columns {
                if !existing.contains(&column) {
                    existing.push(column);
                }
            }
        }
        "delete" => existing.retain(|name| !columns.contains(name)),
        other => {
            return api_error(StatusCode::BAD_REQUEST, &format!("unsupported operation {other}"))
        }
    }
    Json(json!({ "warnings": warnings })).into_response()
}

async fn flush_annotations(State(db): State<Db>, Path(scope_name): Path<String>) -> Response {
    match db.write().await.annotations.get_mut(&scope_name) {
        Some(names) => {
            names.clear();
            StatusCode::OK.into_response()
        }
        None => api_error(StatusCode::NOT_FOUND, "Scope not found"),
    }
}

async fn list_roles(State(db): State<Db>) -> Json<Vec<Role>> {
    Json(db.read().await.roles.clone())
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    Json(db.read().await.users.clone())
}
