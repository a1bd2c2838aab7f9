//! Transport layer
//!
//! Resources never talk to the network directly: they hand a method, a
//! relative URL and [`RequestOptions`] to a [`Session`] and consume the
//! [`Response`] it returns.
//!
//! # Module Structure
//!
//! - [`auth`] - Token source for authenticated requests
//! - [`client`] - `CloudClient`, the entry point owning a session and handing out proxies
//! - [`http`] - `HttpSession`, the reqwest-backed session
//! - [`mock`] - `MockSession`, an in-memory session for tests
//!
//! # Example
//!
//! ```ignore
//! use stacksdk::session::client::CloudClient;
//!
//! async fn example() -> stacksdk::Result<()> {
//!     let client = CloudClient::from_config(None)?;
//!     let node = client.baremetal().get_node("node-1").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod mock;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to a session
pub type SessionRef = Arc<dyn Session>;

/// Per-request options understood by every session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Extra headers. An empty value is sent as an empty header.
    pub headers: BTreeMap<String, String>,
    pub json: Option<Value>,
    pub params: Vec<(String, String)>,
    /// Service type used to pick the endpoint (endpoint filter)
    pub service: Option<String>,
    /// Absolute endpoint to use instead of the catalog entry
    pub endpoint_override: Option<String>,
    pub microversion: Option<String>,
    /// Status codes the session may retry on its own
    pub retriable_status_codes: Vec<u16>,
}

impl RequestOptions {
    pub fn for_service(service: &str) -> Self {
        Self {
            service: Some(service.to_string()),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }
}

/// Response returned by a session for a successful (2xx) exchange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub status: u16,
    /// Header names are lowercase
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl Response {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// JSON body, `null` when the response had none
    pub fn json(&self) -> Value {
        self.body.clone().unwrap_or(Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

/// The HTTP collaborator consumed by resources.
///
/// Implementations return `Err` for non-success statuses: `Error::NotFound`
/// for 404 and `Error::Http` for everything else.
#[async_trait]
pub trait Session: Send + Sync {
    async fn request(&self, method: Method, url: &str, options: RequestOptions)
        -> Result<Response>;

    async fn get(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::GET, url, options).await
    }

    async fn post(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::POST, url, options).await
    }

    async fn put(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PUT, url, options).await
    }

    async fn patch(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PATCH, url, options).await
    }

    async fn delete(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::DELETE, url, options).await
    }

    async fn head(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::HEAD, url, options).await
    }
}
