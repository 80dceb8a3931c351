//! Error types for the appliance connector.
//!
//! # Design
//! Each variant corresponds to one way an action invocation can end in
//! failure. `Display` renders the user-facing message that ends up as the
//! finished action's status message, so variants carry the full text rather
//! than re-deriving it at the call site. None of these are retried.

use thiserror::Error;

/// Generic message for any failure to reach or talk to the appliance.
pub const ERROR_CONNECTING_SERVER: &str = "Error while connecting to server";

/// Errors produced while running an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// Client construction failed or the transport could not complete the
    /// exchange (DNS, refused connection, TLS, unreadable upload file).
    #[error("{0}")]
    Connection(String),

    /// The requested HTTP method is not one the client supports.
    #[error("Unsupported method {0}")]
    UnsupportedMethod(String),

    /// A JSON content-type response whose body did not parse.
    #[error("Unable to parse JSON response. Error: {0}")]
    JsonParse(String),

    /// The server (or a proxy in front of it) answered with an HTML page.
    #[error("{0}")]
    Html(String),

    /// A non-200 response with a body.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Non-200 response with neither a body nor a usable content type.
    #[error("Empty response and no information in the header")]
    EmptyResponse,

    /// Non-empty body with a content type the classifier does not handle.
    #[error("{0}")]
    UnrecognizedContentType(String),

    /// An action parameter failed validation; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The action identifier is not one the connector implements.
    #[error("Unsupported action {0}")]
    UnsupportedAction(String),
}

impl ConnectorError {
    /// Connection failure wrapping the underlying transport error text.
    pub fn connection_details(details: impl std::fmt::Display) -> Self {
        ConnectorError::Connection(format!("{ERROR_CONNECTING_SERVER}. Details: {details}"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ConnectorError::Validation(message.into())
    }
}

/// Result type used throughout the connector.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_details_prefixes_generic_message() {
        let err = ConnectorError::connection_details("connection refused");
        assert_eq!(
            err.to_string(),
            "Error while connecting to server. Details: connection refused"
        );
    }

    #[test]
    fn server_error_displays_message_only() {
        let err = ConnectorError::Server {
            status: 403,
            message: "Error from server. Status Code: 403 Data from server: denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Error from server. Status Code: 403 Data from server: denied"
        );
    }

    #[test]
    fn unsupported_method_names_method() {
        let err = ConnectorError::UnsupportedMethod("patch".to_string());
        assert_eq!(err.to_string(), "Unsupported method patch");
    }
}
