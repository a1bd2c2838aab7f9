//! Auto scaling: launch configurations, groups and the instances they own
//!
//! This service keys its records with type-specific names
//! (`scaling_group_id`, `scaling_configuration_name`, ...) that are mapped
//! onto the usual `id` and `name` attributes.

use crate::error::Result;
use crate::proxy::{resolve, Proxy, ResourceRef};
use crate::resource::{resource_type, Capabilities, Coercion, Field, QueryMapping, Schema, Timestamp};
use crate::session::SessionRef;
use crate::wait::{self, DEFAULT_WAIT_INTERVAL};
use futures::stream::BoxStream;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

pub const SERVICE_TYPE: &str = "auto-scaling";

fn configuration_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("auto-scaling.configuration", SERVICE_TYPE, "/scaling_configuration")
            .resource_key("scaling_configuration")
            .resources_key("scaling_configurations")
            .allow(Capabilities {
                commit: false,
                ..Capabilities::CRUD
            })
            .query(QueryMapping::new(&["image_id"]).rename("name", "scaling_configuration_name"))
            .fields(vec![
                Field::body("id", "scaling_configuration_id"),
                Field::body("name", "scaling_configuration_name"),
                Field::body("created_at", "create_time").coerce(Coercion::Format(&Timestamp)),
                Field::body("instance_config", "instance_config").coerce(Coercion::Dict),
                Field::body("scaling_group_id", "scaling_group_id"),
            ])
    })
}

fn group_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("auto-scaling.group", SERVICE_TYPE, "/scaling_group")
            .resource_key("scaling_group")
            .resources_key("scaling_groups")
            .query(
                QueryMapping::new(&["scaling_configuration_id"])
                    .rename("name", "scaling_group_name")
                    .rename("status", "scaling_group_status"),
            )
            .fields(vec![
                Field::body("id", "scaling_group_id"),
                Field::body("name", "scaling_group_name"),
                Field::body("cool_down_time", "cool_down_time").coerce(Coercion::Integer),
                Field::body("created_at", "create_time").coerce(Coercion::Format(&Timestamp)),
                Field::body("current_instance_number", "current_instance_number").coerce(Coercion::Integer),
                Field::body("desire_instance_number", "desire_instance_number").coerce(Coercion::Integer),
                Field::body("detail", "detail"),
                Field::body("max_instance_number", "max_instance_number").coerce(Coercion::Integer),
                Field::body("min_instance_number", "min_instance_number").coerce(Coercion::Integer),
                Field::body("networks", "networks").coerce(Coercion::List),
                Field::body("scaling_configuration_id", "scaling_configuration_id"),
                Field::body("security_groups", "security_groups").coerce(Coercion::List),
                Field::body("status", "scaling_group_status"),
                Field::body("vpc_id", "vpc_id"),
            ])
    })
}

fn instance_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new(
            "auto-scaling.instance",
            SERVICE_TYPE,
            "/scaling_group_instance/{scaling_group_id}/list",
        )
        .resources_key("scaling_group_instances")
        .allow(Capabilities {
            list: true,
            ..Capabilities::NONE
        })
        .query(QueryMapping::new(&["health_status"]).rename("lifecycle_state", "life_cycle_state"))
        .fields(vec![
            Field::body("id", "instance_id"),
            Field::body("name", "instance_name"),
            Field::body("created_at", "create_time").coerce(Coercion::Format(&Timestamp)),
            Field::body("health_status", "health_status"),
            Field::body("lifecycle_state", "life_cycle_state"),
            Field::body("is_protected", "protect_from_scaling_down").coerce(Coercion::Boolean),
            Field::body("scaling_configuration_id", "scaling_configuration_id"),
            Field::body("scaling_configuration_name", "scaling_configuration_name"),
            Field::uri("scaling_group_id", "scaling_group_id"),
        ])
    })
}

resource_type!(
    /// Launch template used by scaling groups
    ScalingConfiguration => configuration_schema
);

resource_type!(
    /// A group of instances kept between a minimum and a maximum size
    ScalingGroup => group_schema
);

resource_type!(
    /// An instance owned by a scaling group
    ScalingInstance => instance_schema
);

impl ScalingInstance {
    pub fn lifecycle_state(&self) -> Option<String> {
        self.get_str("lifecycle_state")
    }
}

/// Auto scaling service entry point
#[derive(Clone)]
pub struct AutoScalingProxy {
    proxy: Proxy,
    wait_interval: Duration,
}

impl AutoScalingProxy {
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

    // =========================================================================
    // Configurations
    // =========================================================================

    pub fn configs(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<ScalingConfiguration>>> {
        self.proxy.list(params, true)
    }

    pub async fn create_config(&self, attrs: Map<String, Value>) -> Result<ScalingConfiguration> {
        self.proxy.create(attrs).await
    }

    pub async fn get_config(&self, config: impl Into<ResourceRef<ScalingConfiguration>>) -> Result<ScalingConfiguration> {
        self.proxy.get(config).await
    }

    pub async fn find_config(&self, name_or_id: &str, ignore_missing: bool) -> Result<Option<ScalingConfiguration>> {
        self.proxy.find(name_or_id, ignore_missing, BTreeMap::new()).await
    }

    pub async fn delete_config(
        &self,
        config: impl Into<ResourceRef<ScalingConfiguration>>,
        ignore_missing: bool,
    ) -> Result<Option<ScalingConfiguration>> {
        self.proxy.delete(config, ignore_missing).await
    }

    // =========================================================================
    // Groups
    // =========================================================================

    pub fn groups(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<ScalingGroup>>> {
        self.proxy.list(params, true)
    }

    pub async fn create_group(&self, attrs: Map<String, Value>) -> Result<ScalingGroup> {
        self.proxy.create(attrs).await
    }

    pub async fn get_group(&self, group: impl Into<ResourceRef<ScalingGroup>>) -> Result<ScalingGroup> {
        self.proxy.get(group).await
    }

    pub async fn find_group(&self, name_or_id: &str, ignore_missing: bool) -> Result<Option<ScalingGroup>> {
        self.proxy.find(name_or_id, ignore_missing, BTreeMap::new()).await
    }

    pub async fn update_group(
        &self,
        group: impl Into<ResourceRef<ScalingGroup>>,
        attrs: Map<String, Value>,
    ) -> Result<ScalingGroup> {
        self.proxy.update(group, attrs).await
    }

    pub async fn delete_group(
        &self,
        group: impl Into<ResourceRef<ScalingGroup>>,
        ignore_missing: bool,
    ) -> Result<Option<ScalingGroup>> {
        self.proxy.delete(group, ignore_missing).await
    }

    async fn group_action(&self, group: impl Into<ResourceRef<ScalingGroup>>, action: &str) -> Result<()> {
        let group: ScalingGroup = resolve(group.into(), Map::new())?;
        group
            .action(
                self.proxy.session().as_ref(),
                Method::POST,
                "action",
                Some(json!({ "action": action })),
            )
            .await?;
        Ok(())
    }

    pub async fn resume_group(&self, group: impl Into<ResourceRef<ScalingGroup>>) -> Result<()> {
        self.group_action(group, "resume").await
    }

    pub async fn pause_group(&self, group: impl Into<ResourceRef<ScalingGroup>>) -> Result<()> {
        self.group_action(group, "pause").await
    }

    /// Wait for a group's status, e.g. `INSERVICE` after resuming
    pub async fn wait_for_group(
        &self,
        group: impl Into<ResourceRef<ScalingGroup>>,
        status: &str,
        failures: Option<&[&str]>,
        timeout: Option<Duration>,
    ) -> Result<ScalingGroup> {
        let mut group: ScalingGroup = resolve(group.into(), Map::new())?;
        wait::wait_for_status(
            self.proxy.session().as_ref(),
            &mut group,
            status,
            failures,
            self.wait_interval,
            timeout,
        )
        .await?;
        Ok(group)
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Instances of a group, optionally filtered
    pub fn instances(
        &self,
        group_id: &str,
        mut params: BTreeMap<String, Value>,
    ) -> Result<BoxStream<'static, Result<ScalingInstance>>> {
        params.insert("scaling_group_id".to_string(), Value::String(group_id.to_string()));
        self.proxy.list(params, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use crate::session::mock::MockSession;
    use futures::TryStreamExt;
    use std::sync::Arc;

    fn proxy() -> (Arc<MockSession>, AutoScalingProxy) {
        let session = Arc::new(MockSession::new());
        (session.clone(), AutoScalingProxy::new(session).with_wait_interval(Duration::from_secs(1)))
    }

    #[test]
    fn test_group_maps_identity_fields() {
        let group = ScalingGroup::existing(
            json!({"scaling_group_id": "g1", "scaling_group_name": "web", "scaling_group_status": "INSERVICE"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(group.id().as_deref(), Some("g1"));
        assert_eq!(group.name().as_deref(), Some("web"));
        assert_eq!(group.get_str("status").as_deref(), Some("INSERVICE"));
    }

    #[test]
    fn test_configuration_cannot_be_updated() {
        assert!(!ScalingConfiguration::schema().allow.commit);
    }

    #[tokio::test]
    async fn test_resume_group_action() {
        let (session, proxy) = proxy();
        session.push_empty(204);
        proxy.resume_group("g1").await.unwrap();

        let request = &session.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "/scaling_group/g1/action");
        assert_eq!(request.options.json, Some(json!({"action": "resume"})));
    }

    #[tokio::test]
    async fn test_instances_fill_group_path() {
        let (session, proxy) = proxy();
        session.push_json(
            200,
            json!({"scaling_group_instances": [
                {"instance_id": "i1", "instance_name": "web-1", "life_cycle_state": "INSERVICE"}
            ]}),
        );
        session.push_json(200, json!({"scaling_group_instances": []}));

        let mut params = BTreeMap::new();
        params.insert("lifecycle_state".to_string(), json!("INSERVICE"));
        let instances: Vec<ScalingInstance> = proxy.instances("g1", params).unwrap().try_collect().await.unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].lifecycle_state().as_deref(), Some("INSERVICE"));
        assert_eq!(instances[0].get_str("scaling_group_id").as_deref(), Some("g1"));
        let request = &session.requests()[0];
        assert_eq!(request.url, "/scaling_group_instance/g1/list");
        assert_eq!(request.param("life_cycle_state"), Some("INSERVICE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_group_status() {
        let (session, proxy) = proxy();
        session.push_json(200, json!({"scaling_group": {"scaling_group_id": "g1", "scaling_group_status": "PAUSED"}}));
        session.push_json(200, json!({"scaling_group": {"scaling_group_id": "g1", "scaling_group_status": "INSERVICE"}}));

        let group = proxy.wait_for_group("g1", "INSERVICE", None, Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(group.get_str("status").as_deref(), Some("INSERVICE"));
        assert_eq!(session.request_count(), 2);
    }
}
