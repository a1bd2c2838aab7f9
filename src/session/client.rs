//! Cloud client
//!
//! Entry point owning one session for a configured cloud and handing out
//! service proxies that share it.

use super::http::HttpSession;
use super::SessionRef;
use crate::config::{CloudConfig, Config};
use crate::error::Result;
use crate::services::auto_scaling::AutoScalingProxy;
use crate::services::baremetal::BaremetalProxy;
use crate::services::block_storage::BlockStorageProxy;
use crate::services::ecs::EcsProxy;
use crate::services::introspection::IntrospectionProxy;
use crate::services::load_balancer::LoadBalancerProxy;
use crate::services::message_queue::MessageQueueProxy;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct CloudClient {
    session: SessionRef,
    cloud: CloudConfig,
}

impl CloudClient {
    /// Client for a cloud entry, talking HTTP
    pub fn new(cloud: CloudConfig) -> Result<Self> {
        let session = HttpSession::new(&cloud)?;
        Ok(Self {
            session: Arc::new(session),
            cloud,
        })
    }

    /// Client for a named cloud from `clouds.yaml` (see [`Config::cloud`])
    pub fn from_config(name: Option<&str>) -> Result<Self> {
        let cloud = Config::load()?.cloud(name)?;
        tracing::info!(
            "Using cloud {} in region {}",
            name.unwrap_or("<default>"),
            cloud.region_name.as_deref().unwrap_or("<none>")
        );
        Self::new(cloud)
    }

    /// Client over an existing session
    pub fn with_session(session: SessionRef, cloud: CloudConfig) -> Self {
        Self { session, cloud }
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn cloud(&self) -> &CloudConfig {
        &self.cloud
    }

    pub fn wait_interval(&self) -> Duration {
        self.cloud.wait_interval()
    }

    pub fn baremetal(&self) -> BaremetalProxy {
        BaremetalProxy::new(self.session.clone()).with_wait_interval(self.wait_interval())
    }

    pub fn introspection(&self) -> IntrospectionProxy {
        IntrospectionProxy::new(self.session.clone()).with_wait_interval(self.wait_interval())
    }

    pub fn block_storage(&self) -> BlockStorageProxy {
        BlockStorageProxy::new(self.session.clone()).with_wait_interval(self.wait_interval())
    }

    pub fn load_balancer(&self) -> LoadBalancerProxy {
        LoadBalancerProxy::new(self.session.clone()).with_wait_interval(self.wait_interval())
    }

    pub fn auto_scaling(&self) -> AutoScalingProxy {
        AutoScalingProxy::new(self.session.clone()).with_wait_interval(self.wait_interval())
    }

    pub fn message_queue(&self) -> MessageQueueProxy {
        MessageQueueProxy::identified(
            self.session.clone(),
            uuid::Uuid::new_v4().to_string(),
            self.cloud.project_id.clone(),
        )
    }

    pub fn ecs(&self) -> EcsProxy {
        EcsProxy::new(self.session.clone(), self.cloud.project_id.clone())
            .with_wait_interval(self.wait_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockSession;
    use serde_json::json;

    #[tokio::test]
    async fn test_proxies_share_the_session() {
        let session = Arc::new(MockSession::new());
        let cloud = CloudConfig {
            project_id: Some("p1".to_string()),
            ..Default::default()
        };
        let client = CloudClient::with_session(session.clone(), cloud);

        session.push_json(200, json!({"uuid": "n1", "provision_state": "active"}));
        session.push_json(200, json!({"job_id": "j1", "status": "SUCCESS"}));

        let node = client.baremetal().get_node("n1").await.unwrap();
        assert_eq!(node.provision_state().as_deref(), Some("active"));
        client.ecs().get_job("j1").await.unwrap();

        let urls: Vec<String> = session.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["/nodes/n1", "/v1/p1/jobs/j1"]);
    }

    #[test]
    fn test_new_builds_http_session() {
        let cloud = Config::from_yaml(
            "clouds:\n  lab:\n    token: abc\n    endpoints:\n      baremetal: http://127.0.0.1:6385\n",
        )
        .unwrap()
        .cloud(Some("lab"))
        .unwrap();
        let client = CloudClient::new(cloud).unwrap();
        assert_eq!(client.cloud().endpoints["baremetal"], "http://127.0.0.1:6385");
        assert_eq!(client.wait_interval(), Duration::from_secs(2));
    }
}
