//! Signed REST calls against the appliance.
//!
//! # Design
//! `TetrationClient` holds the base URL, the credentials and a `Transport`.
//! A `RestCall` describes one call; `build_request` turns it into a signed
//! `HttpRequest` without touching the network, and `call` executes exactly
//! one exchange and hands the response to the classifier. Client
//! construction rejects bad URLs and credentials up front so no call is ever
//! attempted with them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use ureq::http::Uri;
use uuid::Uuid;

use crate::auth::Credentials;
use crate::classify::{classify, CallOutcome};
use crate::config::ConnectorConfig;
use crate::endpoints::api_path;
use crate::error::{ConnectorError, ConnectorResult, ERROR_CONNECTING_SERVER};
use crate::http::{HttpMethod, HttpRequest, Transport, UreqTransport};
use crate::result::ResultCollector;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Extra multipart form field sent alongside an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartOption {
    pub key: String,
    pub value: String,
}

impl MultipartOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart {
        file_path: PathBuf,
        options: Vec<MultipartOption>,
    },
}

/// One REST call: endpoint, method, body and (for the probe) a timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct RestCall {
    endpoint: String,
    method: HttpMethod,
    body: RequestBody,
    timeout: Option<Duration>,
}

impl RestCall {
    pub fn new(endpoint: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    /// Call whose method arrives as a name, e.g. from a dispatch table.
    pub fn named(endpoint: impl Into<String>, method: &str) -> ConnectorResult<Self> {
        Ok(Self::new(endpoint, method.parse()?))
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, HttpMethod::Get)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, HttpMethod::Post)
    }

    pub fn upload(
        endpoint: impl Into<String>,
        file_path: impl AsRef<Path>,
        options: Vec<MultipartOption>,
    ) -> Self {
        Self::new(endpoint, HttpMethod::Upload).with_body(RequestBody::Multipart {
            file_path: file_path.as_ref().to_path_buf(),
            options,
        })
    }

    /// Connectivity check; the only kind of call that carries a timeout.
    pub fn connectivity_probe(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::get(endpoint)
        }
    }

    pub fn with_json(self, body: Value) -> Self {
        self.with_body(RequestBody::Json(body))
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// REST client bound to one appliance.
#[derive(Debug, Clone)]
pub struct TetrationClient<T = UreqTransport> {
    base_url: String,
    base_path: String,
    credentials: Credentials,
    transport: T,
}

impl TetrationClient<UreqTransport> {
    /// Client using the blocking ureq transport.
    pub fn from_config(config: &ConnectorConfig) -> ConnectorResult<Self> {
        Self::with_transport(config, UreqTransport::new(config.verify_server_cert))
    }
}

impl<T: Transport> TetrationClient<T> {
    pub fn with_transport(config: &ConnectorConfig, transport: T) -> ConnectorResult<Self> {
        let base_url = config.base_url().to_string();
        let uri: Uri = base_url.parse().map_err(|e| {
            debug!(error = %e, "invalid server url");
            connecting_error()
        })?;
        let scheme_ok = matches!(uri.scheme_str(), Some("http") | Some("https"));
        if !scheme_ok || uri.authority().is_none() {
            return Err(connecting_error());
        }
        if config.api_key.trim().is_empty() || config.api_secret.is_empty() {
            return Err(connecting_error());
        }

        Ok(Self {
            base_path: uri.path().trim_end_matches('/').to_string(),
            base_url,
            credentials: Credentials::new(config.api_key.clone(), config.api_secret.clone()),
            transport,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the signed request for `call` without sending it.
    pub fn build_request(&self, call: &RestCall) -> ConnectorResult<HttpRequest> {
        if call.method == HttpMethod::Upload && !matches!(call.body, RequestBody::Multipart { .. }) {
            return Err(ConnectorError::connection_details("no file given for upload"));
        }

        let path = api_path(&call.endpoint);
        let (body, content_type) = match &call.body {
            RequestBody::Empty => (None, JSON_CONTENT_TYPE.to_string()),
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(ConnectorError::connection_details)?;
                (Some(bytes), JSON_CONTENT_TYPE.to_string())
            }
            RequestBody::Multipart { file_path, options } => {
                let (bytes, content_type) = multipart_body(file_path, options)?;
                (Some(bytes), content_type)
            }
        };

        let signed_path = format!("{}{}", self.base_path, path);
        let headers = self.credentials.sign(
            call.method,
            &signed_path,
            &content_type,
            body.as_deref(),
            Utc::now(),
        )?;

        Ok(HttpRequest {
            method: call.method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
            timeout: call.timeout,
        })
    }

    /// Perform exactly one exchange for `call` and classify the response.
    pub fn call(&self, call: RestCall, collector: &mut dyn ResultCollector) -> CallOutcome {
        let request = self.build_request(&call)?;
        debug!(method = %call.method, url = %request.url, "calling appliance");
        let response = self
            .transport
            .execute(&request)
            .map_err(ConnectorError::connection_details)?;
        classify(&response, collector)
    }
}

fn connecting_error() -> ConnectorError {
    ConnectorError::Connection(ERROR_CONNECTING_SERVER.to_string())
}

/// multipart/form-data body: option fields first, then the file part.
fn multipart_body(
    file_path: &Path,
    options: &[MultipartOption],
) -> ConnectorResult<(Vec<u8>, String)> {
    let contents = fs::read(file_path).map_err(ConnectorError::connection_details)?;
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());
    let boundary = format!("----ciscota{}", Uuid::new_v4().simple());

    let mut body = Vec::with_capacity(contents.len() + 256);
    for option in options {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                option.key, option.value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Ok((body, format!("multipart/form-data; boundary={boundary}")))
}
