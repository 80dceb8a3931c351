//! HTTP transport types and the blocking transport that executes them.
//!
//! # Design
//! Requests and responses are plain data. `TetrationClient` builds a signed
//! `HttpRequest`, hands it to a `Transport`, and classifies the returned
//! `HttpResponse`. The transport is the only place that touches the network,
//! so handlers can be tested against a fake transport and the real one
//! (`UreqTransport`) stays a thin mapping onto ureq.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;
use ureq::tls::TlsConfig;

use crate::error::ConnectorError;

/// HTTP method for a request. `Upload` is a multipart POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Upload,
}

/// Method names accepted at the string boundary.
const METHOD_TABLE: &[(&str, HttpMethod)] = &[
    ("get", HttpMethod::Get),
    ("post", HttpMethod::Post),
    ("put", HttpMethod::Put),
    ("delete", HttpMethod::Delete),
    ("upload", HttpMethod::Upload),
];

impl HttpMethod {
    /// Method name as sent on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post | HttpMethod::Upload => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether the request carries a body that must be checksummed.
    pub fn has_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Upload)
    }
}

impl FromStr for HttpMethod {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        METHOD_TABLE
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, method)| *method)
            .ok_or_else(|| ConnectorError::UnsupportedMethod(s.to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = METHOD_TABLE
            .iter()
            .find(|(_, method)| method == self)
            .map(|(name, _)| *name)
            .unwrap_or("get");
        f.write_str(name)
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Connect/overall timeout; only set for the connectivity probe.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// The exchange could not be completed (no HTTP response was received).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

/// Executes one HTTP exchange.
///
/// Implementations must return `Ok` for every completed exchange, whatever
/// the status code; status interpretation belongs to the classifier.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a fresh ureq agent per request.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    verify_tls: bool,
}

impl UreqTransport {
    pub fn new(verify_tls: bool) -> Self {
        Self { verify_tls }
    }

    fn agent(&self, timeout: Option<Duration>) -> ureq::Agent {
        let mut config = ureq::Agent::config_builder().http_status_as_error(false);
        if !self.verify_tls {
            config = config.tls_config(TlsConfig::builder().disable_verification(true).build());
        }
        if let Some(timeout) = timeout {
            config = config
                .timeout_connect(Some(timeout))
                .timeout_global(Some(timeout));
        }
        config.build().new_agent()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(false)
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent(request.timeout);
        let url = request.url.as_str();
        let headers = request.headers.as_slice();
        let body = request.body.as_deref();

        debug!(method = request.method.wire_name(), url, "sending request");
        let result = match request.method {
            HttpMethod::Get => with_headers(agent.get(url), headers).call(),
            HttpMethod::Delete => with_headers(agent.delete(url), headers).call(),
            HttpMethod::Post | HttpMethod::Upload => {
                send_with_body(with_headers(agent.post(url), headers), body)
            }
            HttpMethod::Put => send_with_body(with_headers(agent.put(url), headers), body),
        };

        let mut response = result.map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        // Uncapped and lossy: any completed exchange must reach the classifier.
        let raw = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(|e| TransportError(e.to_string()))?;
        let body = String::from_utf8_lossy(&raw).into_owned();

        debug!(status, "received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
