//! Message queues
//!
//! Queues are addressed by name: the name is the queue's identifier, so
//! creating one is a PUT to `/queues/{name}`. Every request carries the
//! caller's `Client-ID` (a random UUID unless one is configured) and, when
//! known, the `X-PROJECT-ID`.

use crate::error::Result;
use crate::proxy::{Proxy, ResourceRef};
use crate::resource::{resource_type, Capabilities, Coercion, Field, QueryMapping, Schema};
use crate::session::{RequestOptions, Response, Session, SessionRef};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

pub const SERVICE_TYPE: &str = "messaging";

fn queue_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("messaging.queue", SERVICE_TYPE, "/queues")
            .resources_key("queues")
            .allow(Capabilities {
                commit: false,
                ..Capabilities::CRUD
            })
            .query(QueryMapping::new(&["detailed"]))
            .fields(vec![
                Field::body("name", "name").alternate_id(),
                Field::body("default_message_ttl", "_default_message_ttl").coerce(Coercion::Integer),
                Field::body("description", "description"),
                Field::body("href", "href"),
                Field::body("max_messages_post_size", "_max_messages_post_size").coerce(Coercion::Integer),
                Field::header("client_id", CLIENT_ID_HEADER),
                Field::header("project_id", PROJECT_ID_HEADER),
            ])
    })
}

resource_type!(
    /// A named message queue
    Queue => queue_schema
);

pub const CLIENT_ID_HEADER: &str = "Client-ID";

pub const PROJECT_ID_HEADER: &str = "X-PROJECT-ID";

/// Adds the caller's identity headers to requests that do not set them
struct ClientSession {
    inner: SessionRef,
    headers: BTreeMap<String, String>,
}

#[async_trait]
impl Session for ClientSession {
    async fn request(&self, method: Method, url: &str, mut options: RequestOptions) -> Result<Response> {
        for (name, value) in &self.headers {
            options
                .headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self.inner.request(method, url, options).await
    }
}

/// Messaging service entry point
#[derive(Clone)]
pub struct MessageQueueProxy {
    proxy: Proxy,
    client_id: String,
}

impl MessageQueueProxy {
    /// Proxy identifying itself with a fresh random client id
    pub fn new(session: SessionRef) -> Self {
        Self::identified(session, uuid::Uuid::new_v4().to_string(), None)
    }

    /// Proxy sending `client_id` and, if given, `project_id` on every call
    pub fn identified(session: SessionRef, client_id: String, project_id: Option<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(CLIENT_ID_HEADER.to_string(), client_id.clone());
        if let Some(ref project_id) = project_id {
            headers.insert(PROJECT_ID_HEADER.to_string(), project_id.clone());
        }
        let session: SessionRef = Arc::new(ClientSession {
            inner: session,
            headers,
        });
        Self {
            proxy: Proxy::new(session),
            client_id,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn queues(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<Queue>>> {
        self.proxy.list(params, true)
    }

    /// Create a queue; `attrs` must carry its `name`
    pub async fn create_queue(&self, attrs: Map<String, Value>) -> Result<Queue> {
        self.proxy.create(attrs).await
    }

    pub async fn get_queue(&self, queue: impl Into<ResourceRef<Queue>>) -> Result<Queue> {
        self.proxy.get(queue).await
    }

    pub async fn delete_queue(&self, queue: impl Into<ResourceRef<Queue>>, ignore_missing: bool) -> Result<Option<Queue>> {
        self.proxy.delete(queue, ignore_missing).await
    }
}
