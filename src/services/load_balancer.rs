//! Load balancers
//!
//! Load balancer changes are applied asynchronously by the service; the
//! `provisioning_status` attribute goes `PENDING_*` -> `ACTIVE` (or `ERROR`).

use crate::error::Result;
use crate::proxy::{resolve, Proxy, ResourceRef};
use crate::resource::{resource_type, Coercion, Field, QueryMapping, Schema, Timestamp};
use crate::session::SessionRef;
use crate::wait::{self, DEFAULT_WAIT_INTERVAL};
use futures::stream::BoxStream;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

pub const SERVICE_TYPE: &str = "load-balancer";

fn load_balancer_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("load-balancer.load_balancer", SERVICE_TYPE, "/lbaas/loadbalancers")
            .resource_key("loadbalancer")
            .resources_key("loadbalancers")
            .query(
                QueryMapping::new(&[
                    "name",
                    "description",
                    "flavor_id",
                    "operating_status",
                    "project_id",
                    "provider",
                    "provisioning_status",
                    "vip_address",
                    "vip_network_id",
                    "vip_subnet_id",
                ])
                .rename("is_admin_state_up", "admin_state_up"),
            )
            .fields(vec![
                Field::body("created_at", "created_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("description", "description"),
                Field::body("flavor_id", "flavor_id"),
                Field::body("is_admin_state_up", "admin_state_up").coerce(Coercion::Boolean),
                Field::body("listeners", "listeners").coerce(Coercion::List),
                Field::body("operating_status", "operating_status"),
                Field::body("pools", "pools").coerce(Coercion::List),
                Field::body("project_id", "project_id"),
                Field::body("provider", "provider"),
                Field::body("provisioning_status", "provisioning_status"),
                Field::body("updated_at", "updated_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("vip_address", "vip_address"),
                Field::body("vip_network_id", "vip_network_id"),
                Field::body("vip_port_id", "vip_port_id"),
                Field::body("vip_subnet_id", "vip_subnet_id"),
            ])
    })
}

resource_type!(
    /// A load balancer and its VIP
    LoadBalancer => load_balancer_schema
);

/// Load balancing service entry point
#[derive(Clone)]
pub struct LoadBalancerProxy {
    proxy: Proxy,
    wait_interval: Duration,
}

impl LoadBalancerProxy {
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

    pub fn load_balancers(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<LoadBalancer>>> {
        self.proxy.list(params, true)
    }

    pub async fn create_load_balancer(&self, attrs: Map<String, Value>) -> Result<LoadBalancer> {
        self.proxy.create(attrs).await
    }

    pub async fn get_load_balancer(&self, lb: impl Into<ResourceRef<LoadBalancer>>) -> Result<LoadBalancer> {
        self.proxy.get(lb).await
    }

    pub async fn find_load_balancer(&self, name_or_id: &str, ignore_missing: bool) -> Result<Option<LoadBalancer>> {
        self.proxy.find(name_or_id, ignore_missing, BTreeMap::new()).await
    }

    pub async fn update_load_balancer(
        &self,
        lb: impl Into<ResourceRef<LoadBalancer>>,
        attrs: Map<String, Value>,
    ) -> Result<LoadBalancer> {
        self.proxy.update(lb, attrs).await
    }

    pub async fn delete_load_balancer(
        &self,
        lb: impl Into<ResourceRef<LoadBalancer>>,
        ignore_missing: bool,
    ) -> Result<Option<LoadBalancer>> {
        self.proxy.delete(lb, ignore_missing).await
    }

    /// Trigger a failover of the load balancer's amphorae
    pub async fn failover_load_balancer(&self, lb: impl Into<ResourceRef<LoadBalancer>>) -> Result<()> {
        let lb: LoadBalancer = resolve(lb.into(), Map::new())?;
        lb.action(self.proxy.session().as_ref(), Method::PUT, "failover", None)
            .await?;
        Ok(())
    }

    /// Wait until `provisioning_status` reaches `status` (usually `ACTIVE`)
    pub async fn wait_for_load_balancer(
        &self,
        lb: impl Into<ResourceRef<LoadBalancer>>,
        status: &str,
        failures: Option<&[&str]>,
        timeout: Option<Duration>,
    ) -> Result<LoadBalancer> {
        let mut lb: LoadBalancer = resolve(lb.into(), Map::new())?;
        wait::wait_for_attribute(
            self.proxy.session().as_ref(),
            &mut lb,
            "provisioning_status",
            status,
            failures,
            self.wait_interval,
            timeout,
        )
        .await?;
        Ok(lb)
    }
}
