//! Content-type based classification of appliance responses.
//!
//! # Design
//! Every completed HTTP exchange, whatever its status code, lands here. The
//! content type picks one of four handlers (JSON, HTML, text, empty) and the
//! first match wins; anything else is an error. Server-supplied text that is
//! placed into a message has its braces doubled because the message is later
//! interpolated through a format-style template by the host.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{ConnectorError, ERROR_CONNECTING_SERVER};
use crate::http::HttpResponse;
use crate::result::ResultCollector;

/// Longest HTML-derived message surfaced as-is.
pub const MAX_HTML_MESSAGE_LEN: usize = 500;

/// Success payload or terminal error for one REST call.
pub type CallOutcome = Result<Value, ConnectorError>;

/// Classify `response`, recording its raw parts as debug data first.
pub fn classify(response: &HttpResponse, collector: &mut dyn ResultCollector) -> CallOutcome {
    record_debug_data(response, collector);

    let content_type = response.content_type().to_ascii_lowercase();
    debug!(status = response.status, content_type = %content_type, "classifying response");

    let outcome = if content_type.contains("json") {
        process_json(response)
    } else if content_type.contains("html") {
        process_html(response)
    } else if content_type.contains("text") {
        process_text(response)
    } else if response.body.is_empty() {
        process_empty(response)
    } else {
        Err(ConnectorError::UnrecognizedContentType(format!(
            "Can't process response from server. Status Code: {} Data from server: {}",
            response.status,
            escape_braces(&response.body)
        )))
    };

    if let Err(err) = &outcome {
        warn!(status = response.status, error = %err, "request failed");
    }
    outcome
}

fn record_debug_data(response: &HttpResponse, collector: &mut dyn ResultCollector) {
    let headers: Map<String, Value> = response
        .headers
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    collector.add_debug_data(json!({ "r_status_code": response.status }));
    collector.add_debug_data(json!({ "r_text": response.body }));
    collector.add_debug_data(json!({ "r_headers": headers }));
}

fn process_json(response: &HttpResponse) -> CallOutcome {
    let parsed: Value = serde_json::from_str(&response.body)
        .map_err(|e| ConnectorError::JsonParse(e.to_string()))?;

    if response.status == 200 {
        return Ok(parsed);
    }

    let detail = match parsed.get("error").filter(|v| is_truthy(v)) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => escape_braces(&response.body),
    };
    Err(server_error(response.status, &detail))
}

fn process_html(response: &HttpResponse) -> CallOutcome {
    let text = html_to_text(&response.body);
    let message = escape_braces(&format!(
        "Status Code: {}. Data from server:\n{}\n",
        response.status, text
    ));

    if message.chars().count() > MAX_HTML_MESSAGE_LEN {
        return Err(ConnectorError::Html(ERROR_CONNECTING_SERVER.to_string()));
    }
    Err(ConnectorError::Html(message))
}

fn process_text(response: &HttpResponse) -> CallOutcome {
    // Best effort: a body that is not JSON is surfaced as raw text.
    let payload = serde_json::from_str::<Value>(&response.body)
        .unwrap_or_else(|_| Value::String(response.body.clone()));

    if response.status == 200 {
        return Ok(payload);
    }
    Err(server_error(response.status, &escape_braces(&response.body)))
}

fn process_empty(response: &HttpResponse) -> CallOutcome {
    if response.status == 200 {
        return Ok(Value::Object(Map::new()));
    }
    Err(ConnectorError::EmptyResponse)
}

fn server_error(status: u16, detail: &str) -> ConnectorError {
    ConnectorError::Server {
        status,
        message: format!("Error from server. Status Code: {status} Data from server: {detail}"),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Double literal braces so the text survives format-style interpolation.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn hidden_blocks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<!--.*?-->|<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("hidden block pattern")
    })
}

fn tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"))
}

/// Visible text of an HTML page as non-empty trimmed lines.
pub fn html_to_text(html: &str) -> String {
    let without_blocks = hidden_blocks().replace_all(html, "");
    let stripped = tags().replace_all(&without_blocks, "");
    let decoded = decode_entities(&stripped);
    // Entities may have spelled out markup; never let it through.
    let text = tags().replace_all(&decoded, "");

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn numeric_references() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("numeric reference pattern")
    })
}

/// `&#39;`, `&#x27;` and friends; invalid code points are left as written.
fn decode_numeric(text: &str) -> String {
    numeric_references()
        .replace_all(text, |caps: &Captures<'_>| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, Some(dec)) => dec.as_str().parse().ok(),
                (None, None) => None,
            };
            match code.and_then(char::from_u32) {
                Some('\u{a0}') => " ".to_string(),
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn decode_entities(text: &str) -> String {
    // `&amp;` goes last so `&amp;lt;` stays a literal `&lt;`.
    decode_numeric(text)
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ActionResult;

    fn response(status: u16, content_type: &str, body: &str) -> HttpResponse {
        let headers = if content_type.is_empty() {
            Vec::new()
        } else {
            vec![("Content-Type".to_string(), content_type.to_string())]
        };
        HttpResponse {
            status,
            headers,
            body: body.to_string(),
        }
    }

    fn run(resp: &HttpResponse) -> CallOutcome {
        classify(resp, &mut ActionResult::default())
    }

    #[test]
    fn json_200_returns_parsed_body_unchanged() {
        let body = r#"{"results":[{"uuid":"a","host_name":"web-1"}],"offset":null}"#;
        let value = run(&response(200, "application/json", body)).unwrap();
        assert_eq!(value, serde_json::from_str::<Value>(body).unwrap());
    }

    #[test]
    fn json_with_charset_still_matches() {
        let value = run(&response(200, "Application/JSON; charset=utf-8", "[1,2]")).unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn json_parse_failure_includes_parser_text() {
        let err = run(&response(200, "application/json", "{not json")).unwrap_err();
        match err {
            ConnectorError::JsonParse(detail) => assert!(!detail.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        let err = run(&response(200, "application/json", "{not json")).unwrap_err();
        assert!(err.to_string().starts_with("Unable to parse JSON response. Error: "));
    }

    #[test]
    fn json_error_field_is_used_verbatim() {
        let err = run(&response(403, "application/json", r#"{"error":"Access {denied}"}"#))
            .unwrap_err();
        assert_eq!(
            err,
            ConnectorError::Server {
                status: 403,
                message: "Error from server. Status Code: 403 Data from server: Access {denied}"
                    .to_string(),
            }
        );
    }

    #[test]
    fn json_without_error_field_escapes_raw_body() {
        let err = run(&response(500, "application/json", r#"{"detail":"boom"}"#)).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Error from server. Status Code: 500 Data from server: {{"detail":"boom"}}"#
        );
    }

    #[test]
    fn json_empty_error_field_falls_back_to_body() {
        let err = run(&response(400, "application/json", r#"{"error":""}"#)).unwrap_err();
        assert!(err.to_string().ends_with(r#"{{"error":""}}"#));
    }

    #[test]
    fn html_is_error_even_with_200() {
        let body = "<html><head><title>Bad Gateway</title><style>p {color: red}</style></head>\
                    <body>\n<h1>502</h1>\n  <p>upstream   down</p>\n</body></html>";
        let err = run(&response(200, "text/html", body)).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ConnectorError::Html(_)));
        assert!(!message.contains('<'));
        assert!(!message.contains("color"));
        assert_eq!(
            message,
            "Status Code: 200. Data from server:\nBad Gateway\n502\nupstream   down\n"
        );
    }

    #[test]
    fn long_html_is_replaced_with_generic_message() {
        let body = format!("<html><body><p>{}</p></body></html>", "x".repeat(600));
        let err = run(&response(502, "text/html; charset=utf-8", &body)).unwrap_err();
        assert_eq!(err.to_string(), ERROR_CONNECTING_SERVER);
    }

    #[test]
    fn numeric_character_references_are_decoded() {
        assert_eq!(
            html_to_text("<p>it&#x27;s&#160;down &#8217;now&#8217;</p>"),
            "it's down \u{2019}now\u{2019}"
        );
        assert_eq!(html_to_text("<p>&#65;&#X42;</p>"), "AB");
        assert_eq!(html_to_text("<p>&#xD800; &amp;#39;</p>"), "&#xD800; &#39;");
    }

    #[test]
    fn html_entities_never_reintroduce_tags() {
        let body = "<p>&lt;b&gt;bold&lt;/b&gt; &amp; plain</p>";
        let err = run(&response(500, "text/html", body)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Status Code: 500. Data from server:\nbold & plain\n"
        );
    }

    #[test]
    fn text_json_body_is_parsed() {
        let value = run(&response(200, "text/plain", r#"{"warnings":[]}"#)).unwrap();
        assert_eq!(value, json!({"warnings": []}));
    }

    #[test]
    fn text_falls_back_to_raw_text() {
        let value = run(&response(200, "text/plain", "ok, uploaded")).unwrap();
        assert_eq!(value, Value::String("ok, uploaded".to_string()));
    }

    #[test]
    fn text_non_200_is_server_error() {
        let err = run(&response(404, "text/plain", "no {scope}")).unwrap_err();
        assert_eq!(
            err,
            ConnectorError::Server {
                status: 404,
                message: "Error from server. Status Code: 404 Data from server: no {{scope}}"
                    .to_string(),
            }
        );
    }

    #[test]
    fn empty_200_is_empty_object() {
        let value = run(&response(200, "", "")).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn empty_non_200_is_empty_response_error() {
        for status in [201, 204, 401, 500] {
            let err = run(&response(status, "", "")).unwrap_err();
            assert_eq!(err, ConnectorError::EmptyResponse);
        }
    }

    #[test]
    fn unknown_content_type_with_body_is_error() {
        let err = run(&response(200, "application/octet-stream", "\u{1}{x}")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't process response from server. Status Code: 200 Data from server: \u{1}{{x}}"
        );
    }

    #[test]
    fn debug_data_is_recorded_regardless_of_outcome() {
        let mut result = ActionResult::default();
        let _ = classify(&response(500, "application/octet-stream", "x"), &mut result);
        let debug = result.debug_data();
        assert_eq!(debug.len(), 3);
        assert_eq!(debug[0]["r_status_code"], 500);
        assert_eq!(debug[1]["r_text"], "x");
        assert_eq!(debug[2]["r_headers"]["Content-Type"], "application/octet-stream");
        assert!(result.data().is_empty());
    }

    #[test]
    fn html_to_text_collapses_blank_lines() {
        assert_eq!(
            html_to_text("<div>\n\n  a  \n<!-- hidden -->\n<span>b</span>\n\n</div>"),
            "a\nb"
        );
    }
}
