//! Scripted transport for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};

/// Replays queued responses in order and records every request it sees.
#[derive(Debug, Default)]
pub struct FakeTransport {
    replies: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    pub requests: RefCell<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_json(self, status: u16, body: &str) -> Self {
        self.reply(status, "application/json", body)
    }

    pub fn reply(self, status: u16, content_type: &str, body: &str) -> Self {
        self.replies.borrow_mut().push_back(Ok(HttpResponse {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: body.to_string(),
        }));
        self
    }

    pub fn fail(self, error: &str) -> Self {
        self.replies
            .borrow_mut()
            .push_back(Err(TransportError(error.to_string())));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.url.clone()).collect()
    }
}

impl Transport for FakeTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted reply".to_string())))
    }
}
