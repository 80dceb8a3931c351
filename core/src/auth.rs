//! Per-request signing with the API key and secret.
//!
//! The appliance authenticates every request by an HMAC-SHA256 over a
//! canonical string built from the method, path, body checksum, content type
//! and timestamp. The key travels in the `Id` header and the base64 digest in
//! `Authorization`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{ConnectorError, ERROR_CONNECTING_SERVER};
use crate::http::HttpMethod;

type HmacSha256 = Hmac<Sha256>;

pub const USER_AGENT: &str = "ciscota-connector";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+0000";

/// API key/secret pair.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Headers that authenticate one request.
    ///
    /// `path` is the path (and query) part of the URL exactly as sent.
    pub fn sign(
        &self,
        method: HttpMethod,
        path: &str,
        content_type: &str,
        body: Option<&[u8]>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, ConnectorError> {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let checksum = if method.has_body() {
            Some(hex_digest(body.unwrap_or_default()))
        } else {
            None
        };

        let canonical = format!(
            "{}\n{}\n{}\n{}\n{}\n",
            method.wire_name(),
            path,
            checksum.as_deref().unwrap_or(""),
            content_type,
            timestamp
        );

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| ConnectorError::Connection(ERROR_CONNECTING_SERVER.to_string()))?;
        mac.update(canonical.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let mut headers = vec![
            ("Id".to_string(), self.api_key.clone()),
            ("Timestamp".to_string(), timestamp),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("Content-Type".to_string(), content_type.to_string()),
        ];
        if let Some(checksum) = checksum {
            headers.push(("X-Tetration-Cksum".to_string(), checksum));
        }
        headers.push(("Authorization".to_string(), signature));
        Ok(headers)
    }
}

fn hex_digest(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
