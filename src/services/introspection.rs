//! Hardware introspection of bare metal nodes
//!
//! An introspection is keyed by the node's UUID: starting one is a POST to
//! `/introspection/{node}` and its progress is read back from the same path.

use crate::error::{Error, Result};
use crate::proxy::{resolve, Proxy, ResourceRef};
use crate::resource::{resource_type, Capabilities, Coercion, Field, QueryMapping, Schema, Timestamp};
use crate::session::{Session, SessionRef};
use crate::wait::{WaitPolicy, DEFAULT_WAIT_INTERVAL};
use futures::stream::BoxStream;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

pub const SERVICE_TYPE: &str = "baremetal-introspection";

fn introspection_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("baremetal-introspection.introspection", SERVICE_TYPE, "/introspection")
            .resources_key("introspection")
            .allow(Capabilities::READ_ONLY)
            .query(QueryMapping::new(&[]))
            .fields(vec![
                Field::body("id", "uuid"),
                Field::body("error", "error"),
                Field::body("is_finished", "finished").coerce(Coercion::Boolean),
                Field::body("finished_at", "finished_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("links", "links").coerce(Coercion::List),
                Field::body("started_at", "started_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("state", "state"),
            ])
    })
}

resource_type!(
    /// Progress of one node's introspection
    Introspection => introspection_schema
);

impl Introspection {
    pub fn is_finished(&self) -> bool {
        self.get_bool("is_finished").unwrap_or(false)
    }

    /// Kick off introspection of the node this record is keyed by
    pub async fn start(&mut self, session: &dyn Session, manage_boot: Option<bool>) -> Result<()> {
        let request = self.prepare_request(true, false)?;
        let mut options = self.request_options();
        if let Some(manage_boot) = manage_boot {
            options.params.push(("manage_boot".to_string(), manage_boot.to_string()));
        }

        tracing::info!("Starting introspection of node {}", self.id().unwrap_or_default());
        session.post(&request.uri, options).await?;
        Ok(())
    }

    /// Abort a running introspection. A finished one is left alone.
    pub async fn abort(&mut self, session: &dyn Session) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        self.action(session, Method::POST, "abort", None).await?;
        Ok(())
    }

    /// Collected introspection data
    pub async fn get_data(&self, session: &dyn Session, processed: bool) -> Result<Value> {
        let suffix = if processed { "data" } else { "data/unprocessed" };
        let response = self.action(session, Method::GET, suffix, None).await?;
        Ok(response.json())
    }

    /// Poll until introspection finishes.
    ///
    /// A finished introspection in the `error` state raises
    /// `ResourceFailure` unless `ignore_error`.
    pub async fn wait(&mut self, session: &dyn Session, policy: WaitPolicy, ignore_error: bool) -> Result<()> {
        let id = self.id().unwrap_or_default();
        if self.check_finished(ignore_error)? {
            return Ok(());
        }

        let mut ticker = policy.ticker(format!("Timeout waiting for introspection on node {}", id));
        loop {
            ticker.next().await?;
            self.fetch(session).await?;
            if self.check_finished(ignore_error)? {
                return Ok(());
            }
            tracing::debug!(
                "Still waiting for introspection of node {}, the current state is {:?}",
                id,
                self.get_str("state")
            );
        }
    }

    fn check_finished(&self, ignore_error: bool) -> Result<bool> {
        if self.get_str("state").as_deref() == Some("error") && !ignore_error {
            return Err(Error::ResourceFailure(format!(
                "Introspection of node {} failed: {}",
                self.id().unwrap_or_default(),
                self.get_str("error").unwrap_or_default()
            )));
        }
        Ok(self.is_finished())
    }
}

/// Introspection service entry point
#[derive(Clone)]
pub struct IntrospectionProxy {
    proxy: Proxy,
    wait_interval: Duration,
}

impl IntrospectionProxy {
    pub fn new(session: SessionRef) -> Self {
        Self {
            proxy: Proxy::new(session),
            wait_interval: DEFAULT_WAIT_INTERVAL,
        }
    }

    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = interval;
        self
    }

    pub fn introspections(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<Introspection>>> {
        self.proxy.list(params, true)
    }

    /// Start introspection of a node, given the node's id
    pub async fn start_introspection(&self, node_id: &str, manage_boot: Option<bool>) -> Result<Introspection> {
        let mut introspection: Introspection = resolve(node_id.into(), Map::new())?;
        introspection
            .start(self.proxy.session().as_ref(), manage_boot)
            .await?;
        Ok(introspection)
    }

    pub async fn get_introspection(&self, introspection: impl Into<ResourceRef<Introspection>>) -> Result<Introspection> {
        self.proxy.get(introspection).await
    }

    pub async fn get_introspection_data(
        &self,
        introspection: impl Into<ResourceRef<Introspection>>,
        processed: bool,
    ) -> Result<Value> {
        let introspection: Introspection = resolve(introspection.into(), Map::new())?;
        introspection
            .get_data(self.proxy.session().as_ref(), processed)
            .await
    }

    pub async fn abort_introspection(
        &self,
        introspection: impl Into<ResourceRef<Introspection>>,
        ignore_missing: bool,
    ) -> Result<()> {
        let mut introspection: Introspection = resolve(introspection.into(), Map::new())?;
        match introspection.abort(self.proxy.session().as_ref()).await {
            Err(e) if e.is_not_found() && ignore_missing => Ok(()),
            other => other,
        }
    }

    pub async fn wait_for_introspection(
        &self,
        introspection: impl Into<ResourceRef<Introspection>>,
        timeout: Option<Duration>,
        ignore_error: bool,
    ) -> Result<Introspection> {
        let mut introspection: Introspection = resolve(introspection.into(), Map::new())?;
        introspection
            .wait(
                self.proxy.session().as_ref(),
                WaitPolicy::new(self.wait_interval, timeout),
                ignore_error,
            )
            .await?;
        Ok(introspection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use crate::session::mock::MockSession;
    use serde_json::json;
    use std::sync::Arc;

    fn proxy() -> (Arc<MockSession>, IntrospectionProxy) {
        let session = Arc::new(MockSession::new());
        let proxy = IntrospectionProxy::new(session.clone()).with_wait_interval(Duration::from_secs(1));
        (session, proxy)
    }

    #[tokio::test]
    async fn test_start_posts_to_node_path() {
        let (session, proxy) = proxy();
        session.push_empty(202);

        proxy.start_introspection("n1", Some(false)).await.unwrap();

        let request = &session.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "/introspection/n1");
        assert_eq!(request.param("manage_boot"), Some("false"));
        assert_eq!(request.options.service.as_deref(), Some(SERVICE_TYPE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_finished() {
        let (session, proxy) = proxy();
        session.push_json(200, json!({"uuid": "n1", "finished": false, "state": "waiting"}));
        session.push_json(200, json!({"uuid": "n1", "finished": true, "state": "finished"}));

        let done = proxy.wait_for_introspection("n1", Some(Duration::from_secs(10)), false).await.unwrap();
        assert!(done.is_finished());
        assert_eq!(session.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_raises_unless_ignored() {
        let (session, proxy) = proxy();
        session.push_json(200, json!({"uuid": "n1", "finished": true, "state": "error", "error": "BMC unreachable"}));
        let err = proxy.wait_for_introspection("n1", None, false).await.unwrap_err();
        assert!(matches!(err, Error::ResourceFailure(ref m) if m.contains("BMC unreachable")));

        session.push_json(200, json!({"uuid": "n1", "finished": true, "state": "error"}));
        let done = proxy.wait_for_introspection("n1", None, true).await.unwrap();
        assert!(done.is_finished());
    }

    #[tokio::test]
    async fn test_abort_skips_finished() {
        let (session, proxy) = proxy();
        let finished = Introspection::existing(json!({"uuid": "n1", "finished": true}).as_object().cloned().unwrap());
        proxy.abort_introspection(finished, false).await.unwrap();
        assert_eq!(session.request_count(), 0);

        session.push_error(404, "");
        proxy.abort_introspection("n2", true).await.unwrap();
        assert_eq!(session.requests()[0].url, "/introspection/n2/abort");
    }

    #[tokio::test]
    async fn test_get_data() {
        let (session, proxy) = proxy();
        session.push_json(200, json!({"cpu_arch": "x86_64"}));
        let data = proxy.get_introspection_data("n1", false).await.unwrap();
        assert_eq!(data["cpu_arch"], json!("x86_64"));
        assert_eq!(session.requests()[0].url, "/introspection/n1/data/unprocessed");
    }
}
