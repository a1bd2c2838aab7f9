//! In-memory session for tests
//!
//! `MockSession` replays queued replies in FIFO order and records every
//! request it receives, so tests can assert on both the calls made and the
//! resulting resource state without a network.
//!
//! ```ignore
//! let session = Arc::new(MockSession::new());
//! session.push_json(200, json!({"uuid": "n1", "provision_state": "active"}));
//! let mut node = Node::with_id("n1");
//! node.fetch(session.as_ref()).await?;
//! assert_eq!(session.requests()[0].url, "/nodes/n1");
//! ```

use super::{RequestOptions, Response, Session};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A request observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub options: RequestOptions,
}

impl RecordedRequest {
    /// Value of a query parameter, if sent
    pub fn param(&self, name: &str) -> Option<&str> {
        self.options
            .params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

enum Reply {
    Ok(Response),
    Status { status: u16, body: String },
}

#[derive(Default)]
pub struct MockSession {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn push_response(&self, response: Response) {
        self.lock_replies().push_back(Reply::Ok(response));
    }

    /// Queue a successful response with a JSON body
    pub fn push_json(&self, status: u16, body: Value) {
        self.push_response(Response::new(status, Some(body)));
    }

    /// Queue a successful response without a body
    pub fn push_empty(&self, status: u16) {
        self.push_response(Response::new(status, None));
    }

    /// Queue a failure; 404 becomes `Error::NotFound`
    pub fn push_error(&self, status: u16, body: &str) {
        self.lock_replies().push_back(Reply::Status {
            status,
            body: body.to_string(),
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Reply>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Session for MockSession {
    async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        tracing::debug!("mock {} {}", method, url);

        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                method: method.clone(),
                url: url.to_string(),
                options,
            });

        match self.lock_replies().pop_front() {
            Some(Reply::Ok(response)) => Ok(response),
            Some(Reply::Status { status, body }) => Err(Error::from_status(
                method.as_str(),
                url,
                status,
                &body,
                None,
            )),
            None => Err(Error::InvalidRequest(format!(
                "no reply queued for {} {}",
                method, url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let session = MockSession::new();
        session.push_json(200, json!({"a": 1}));
        session.push_error(404, "missing");

        let first = session.get("/a", RequestOptions::default()).await.unwrap();
        assert_eq!(first.json()["a"], 1);

        let second = session.delete("/b", RequestOptions::default()).await;
        assert!(second.unwrap_err().is_not_found());

        let requests = session.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::DELETE);
        assert_eq!(requests[1].url, "/b");
    }

    #[tokio::test]
    async fn test_empty_queue_is_an_error() {
        let session = MockSession::new();
        let result = session.get("/nothing", RequestOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }
}
