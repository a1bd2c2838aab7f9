use super::{Allocation, Node, Port, ProvisionRequest};
use crate::error::Result;
use crate::proxy::{resolve, Proxy, ResourceRef};
use crate::session::SessionRef;
use crate::wait::{WaitPolicy, DEFAULT_WAIT_INTERVAL};
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of waiting on several nodes at once
#[derive(Debug, Default)]
pub struct WaitResult {
    pub success: Vec<Node>,
    pub failure: Vec<Node>,
    pub timeout: Vec<Node>,
}

/// Bare metal service entry point
#[derive(Clone)]
pub struct BaremetalProxy {
    proxy: Proxy,
    wait_interval: Duration,
}

impl BaremetalProxy {
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

    fn policy(&self, timeout: Option<Duration>) -> WaitPolicy {
        WaitPolicy::new(self.wait_interval, timeout)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub fn nodes(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<Node>>> {
        self.proxy.list(params, true)
    }

    pub async fn create_node(&self, attrs: Map<String, Value>) -> Result<Node> {
        self.proxy.create(attrs).await
    }

    pub async fn get_node(&self, node: impl Into<ResourceRef<Node>>) -> Result<Node> {
        self.proxy.get(node).await
    }

    pub async fn find_node(&self, name_or_id: &str, ignore_missing: bool) -> Result<Option<Node>> {
        self.proxy.find(name_or_id, ignore_missing, BTreeMap::new()).await
    }

    pub async fn update_node(&self, node: impl Into<ResourceRef<Node>>, attrs: Map<String, Value>) -> Result<Node> {
        self.proxy.update(node, attrs).await
    }

    pub async fn delete_node(&self, node: impl Into<ResourceRef<Node>>, ignore_missing: bool) -> Result<Option<Node>> {
        self.proxy.delete(node, ignore_missing).await
    }

    /// Run a provision action. With `wait`, block until the expected
    /// state is reached or `timeout` expires.
    pub async fn set_node_provision_state(
        &self,
        node: impl Into<ResourceRef<Node>>,
        request: ProvisionRequest,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<Node> {
        let mut node: Node = resolve(node.into(), Map::new())?;
        let policy = wait.then(|| self.policy(timeout));
        node.set_provision_state(self.proxy.session().as_ref(), request, policy)
            .await?;
        Ok(node)
    }

    pub async fn set_node_power_state(
        &self,
        node: impl Into<ResourceRef<Node>>,
        target: &str,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<Node> {
        let mut node: Node = resolve(node.into(), Map::new())?;
        let policy = wait.then(|| self.policy(timeout));
        node.set_power_state(self.proxy.session().as_ref(), target, policy)
            .await?;
        Ok(node)
    }

    pub async fn set_node_maintenance(&self, node: impl Into<ResourceRef<Node>>, reason: Option<&str>) -> Result<Node> {
        let mut node: Node = resolve(node.into(), Map::new())?;
        node.set_maintenance(self.proxy.session().as_ref(), reason).await?;
        Ok(node)
    }

    pub async fn unset_node_maintenance(&self, node: impl Into<ResourceRef<Node>>) -> Result<Node> {
        let mut node: Node = resolve(node.into(), Map::new())?;
        node.unset_maintenance(self.proxy.session().as_ref()).await?;
        Ok(node)
    }

    /// Wait for several nodes to reach `expected`.
    ///
    /// With `fail`, the first failed node or the timeout is returned as an
    /// error. Without it, nodes are sorted into the buckets of [`WaitResult`].
    pub async fn wait_for_nodes_provision_state<I>(
        &self,
        nodes: I,
        expected: &str,
        timeout: Option<Duration>,
        abort_on_failed_state: bool,
        fail: bool,
    ) -> Result<WaitResult>
    where
        I: IntoIterator,
        I::Item: Into<ResourceRef<Node>>,
    {
        let mut remaining: Vec<Node> = nodes
            .into_iter()
            .map(|n| resolve(n.into(), Map::new()))
            .collect::<Result<_>>()?;
        let ids: Vec<String> = remaining.iter().filter_map(|n| n.id()).collect();

        let session = self.proxy.session().as_ref();
        let mut result = WaitResult::default();
        let mut ticker = self.policy(timeout).ticker(format!(
            "Timeout waiting for nodes {} to reach target state '{}'",
            ids.join(", "),
            expected
        ));

        loop {
            if let Err(e) = ticker.next().await {
                if fail {
                    return Err(e);
                }
                result.timeout = remaining;
                return Ok(result);
            }

            let mut pending = Vec::with_capacity(remaining.len());
            for mut node in std::mem::take(&mut remaining) {
                node.fetch(session).await?;
                match node.check_state_reached(expected, abort_on_failed_state) {
                    Ok(true) => result.success.push(node),
                    Ok(false) => pending.push(node),
                    Err(e) if fail => return Err(e),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        result.failure.push(node);
                    },
                }
            }
            remaining = pending;

            if remaining.is_empty() {
                return Ok(result);
            }

            tracing::debug!(
                "Still waiting for nodes {} to reach state '{}'",
                remaining
                    .iter()
                    .filter_map(|n| n.id())
                    .collect::<Vec<_>>()
                    .join(", "),
                expected
            );
        }
    }

    pub async fn wait_for_node_reservation(
        &self,
        node: impl Into<ResourceRef<Node>>,
        timeout: Option<Duration>,
    ) -> Result<Node> {
        let mut node: Node = resolve(node.into(), Map::new())?;
        let session = self.proxy.session().as_ref();
        // A bare id carries no reservation yet
        if node.reservation().is_none() && node.get_str("provision_state").is_none() {
            node.fetch(session).await?;
        }
        node.wait_for_reservation(session, self.policy(timeout)).await?;
        Ok(node)
    }

    // =========================================================================
    // Ports
    // =========================================================================

    pub fn ports(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<Port>>> {
        self.proxy.list(params, true)
    }

    pub async fn create_port(&self, attrs: Map<String, Value>) -> Result<Port> {
        self.proxy.create(attrs).await
    }

    pub async fn get_port(&self, port: impl Into<ResourceRef<Port>>) -> Result<Port> {
        self.proxy.get(port).await
    }

    pub async fn find_port(&self, name_or_id: &str, ignore_missing: bool) -> Result<Option<Port>> {
        self.proxy.find(name_or_id, ignore_missing, BTreeMap::new()).await
    }

    pub async fn update_port(&self, port: impl Into<ResourceRef<Port>>, attrs: Map<String, Value>) -> Result<Port> {
        self.proxy.update(port, attrs).await
    }

    pub async fn delete_port(&self, port: impl Into<ResourceRef<Port>>, ignore_missing: bool) -> Result<Option<Port>> {
        self.proxy.delete(port, ignore_missing).await
    }

    // =========================================================================
    // Allocations
    // =========================================================================

    pub fn allocations(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<Allocation>>> {
        self.proxy.list(params, true)
    }

    pub async fn create_allocation(&self, attrs: Map<String, Value>) -> Result<Allocation> {
        self.proxy.create(attrs).await
    }

    pub async fn get_allocation(&self, allocation: impl Into<ResourceRef<Allocation>>) -> Result<Allocation> {
        self.proxy.get(allocation).await
    }

    pub async fn update_allocation(
        &self,
        allocation: impl Into<ResourceRef<Allocation>>,
        attrs: Map<String, Value>,
    ) -> Result<Allocation> {
        self.proxy.update(allocation, attrs).await
    }

    pub async fn delete_allocation(
        &self,
        allocation: impl Into<ResourceRef<Allocation>>,
        ignore_missing: bool,
    ) -> Result<Option<Allocation>> {
        self.proxy.delete(allocation, ignore_missing).await
    }

    pub async fn wait_for_allocation(
        &self,
        allocation: impl Into<ResourceRef<Allocation>>,
        timeout: Option<Duration>,
        ignore_error: bool,
    ) -> Result<Allocation> {
        let mut allocation: Allocation = resolve(allocation.into(), Map::new())?;
        allocation
            .wait(self.proxy.session().as_ref(), self.policy(timeout), ignore_error)
            .await?;
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::session::mock::MockSession;
    use futures::TryStreamExt;
    use serde_json::json;
    use std::sync::Arc;

    fn proxy() -> (Arc<MockSession>, BaremetalProxy) {
        let session = Arc::new(MockSession::new());
        let proxy = BaremetalProxy::new(session.clone()).with_wait_interval(Duration::from_secs(1));
        (session, proxy)
    }

    fn state(id: &str, state: &str) -> Value {
        json!({"uuid": id, "provision_state": state})
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_nodes_sorts_outcomes() {
        let (session, proxy) = proxy();
        session.push_json(200, state("n1", "available"));
        session.push_json(200, state("n2", "clean failed"));
        session.push_json(200, state("n3", "cleaning"));
        session.push_json(200, state("n3", "cleaning"));

        let result = proxy
            .wait_for_nodes_provision_state(["n1", "n2", "n3"], "available", Some(Duration::from_secs(2)), true, false)
            .await
            .unwrap();

        assert_eq!(result.success.len(), 1);
        assert_eq!(result.failure.len(), 1);
        assert_eq!(result.timeout.len(), 1);
        assert_eq!(result.timeout[0].id().as_deref(), Some("n3"));
        assert_eq!(session.request_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_nodes_fail_raises() {
        let (session, proxy) = proxy();
        session.push_json(200, state("n1", "deploy failed"));

        let err = proxy
            .wait_for_nodes_provision_state(["n1"], "active", None, true, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceFailure(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_nodes_all_done() {
        let (session, proxy) = proxy();
        session.push_json(200, state("n1", "deploying"));
        session.push_json(200, state("n1", "active"));

        let result = proxy
            .wait_for_nodes_provision_state(vec!["n1".to_string()], "active", None, true, true)
            .await
            .unwrap();
        assert_eq!(result.success.len(), 1);
        assert!(result.failure.is_empty() && result.timeout.is_empty());
    }

    #[tokio::test]
    async fn test_list_nodes_with_filters() {
        let (session, proxy) = proxy();
        session.push_json(200, json!({"nodes": [state("n1", "active")]}));

        let mut params = BTreeMap::new();
        params.insert("is_maintenance".to_string(), json!(false));
        params.insert("limit".to_string(), json!(10));
        let nodes: Vec<Node> = proxy.nodes(params).unwrap().try_collect().await.unwrap();

        assert_eq!(nodes.len(), 1);
        let request = &session.requests()[0];
        assert_eq!(request.url, "/nodes");
        assert_eq!(request.param("maintenance"), Some("false"));
        assert_eq!(request.param("limit"), Some("10"));
    }

    #[tokio::test]
    async fn test_create_port() {
        let (session, proxy) = proxy();
        session.push_json(201, json!({"uuid": "p1", "address": "aa:bb", "node_uuid": "n1"}));

        let mut attrs = Map::new();
        attrs.insert("address".into(), json!("aa:bb"));
        attrs.insert("node_id".into(), json!("n1"));
        let port = proxy.create_port(attrs).await.unwrap();

        assert_eq!(port.id().as_deref(), Some("p1"));
        let request = &session.requests()[0];
        assert_eq!(request.url, "/ports");
        assert_eq!(request.options.json, Some(json!({"address": "aa:bb", "node_uuid": "n1"})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_node_reservation_fetches_stub_first() {
        let (session, proxy) = proxy();
        session.push_json(200, json!({"uuid": "n1", "provision_state": "active", "reservation": "c1"}));
        session.push_json(200, json!({"uuid": "n1", "provision_state": "active", "reservation": null}));

        let node = proxy.wait_for_node_reservation("n1", None).await.unwrap();
        assert!(node.reservation().is_none());
        assert_eq!(session.request_count(), 2);
    }
}
