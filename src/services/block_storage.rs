//! Block storage volumes

use crate::error::Result;
use crate::proxy::{resolve, Proxy, ResourceRef};
use crate::resource::{resource_type, BoolStr, Coercion, Field, QueryMapping, Schema, Timestamp};
use crate::session::SessionRef;
use crate::wait::{self, DEFAULT_WAIT_INTERVAL};
use futures::stream::BoxStream;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

pub const SERVICE_TYPE: &str = "volume";

fn volume_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("volume.volume", SERVICE_TYPE, "/volumes")
            .resource_key("volume")
            .resources_key("volumes")
            .query(
                QueryMapping::new(&["name", "status", "project_id"])
                    .rename("all_projects", "all_tenants"),
            )
            .fields(vec![
                Field::body("attachments", "attachments").coerce(Coercion::List),
                Field::body("availability_zone", "availability_zone"),
                Field::body("created_at", "created_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("description", "description"),
                Field::body("image_id", "imageRef"),
                Field::body("is_bootable", "bootable").coerce(Coercion::Format(&BoolStr)),
                Field::body("is_encrypted", "encrypted").coerce(Coercion::Boolean),
                Field::body("metadata", "metadata").coerce(Coercion::Dict),
                Field::body("migration_status", "migration_status"),
                Field::body("size", "size").coerce(Coercion::Integer),
                Field::body("snapshot_id", "snapshot_id"),
                Field::body("source_volume_id", "source_volid"),
                Field::body("status", "status"),
                Field::body("updated_at", "updated_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("volume_type", "volume_type"),
            ])
    })
}

resource_type!(
    /// A block storage volume
    Volume => volume_schema
);

/// Block storage service entry point
#[derive(Clone)]
pub struct BlockStorageProxy {
    proxy: Proxy,
    wait_interval: Duration,
}

impl BlockStorageProxy {
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

    pub fn volumes(&self, params: BTreeMap<String, Value>) -> Result<BoxStream<'static, Result<Volume>>> {
        self.proxy.list(params, true)
    }

    pub async fn create_volume(&self, attrs: Map<String, Value>) -> Result<Volume> {
        self.proxy.create(attrs).await
    }

    pub async fn get_volume(&self, volume: impl Into<ResourceRef<Volume>>) -> Result<Volume> {
        self.proxy.get(volume).await
    }

    pub async fn find_volume(&self, name_or_id: &str, ignore_missing: bool) -> Result<Option<Volume>> {
        self.proxy.find(name_or_id, ignore_missing, BTreeMap::new()).await
    }

    pub async fn update_volume(&self, volume: impl Into<ResourceRef<Volume>>, attrs: Map<String, Value>) -> Result<Volume> {
        self.proxy.update(volume, attrs).await
    }

    pub async fn delete_volume(&self, volume: impl Into<ResourceRef<Volume>>, ignore_missing: bool) -> Result<Option<Volume>> {
        self.proxy.delete(volume, ignore_missing).await
    }

    /// Grow a volume to `size` GiB
    pub async fn extend_volume(&self, volume: impl Into<ResourceRef<Volume>>, size: u64) -> Result<()> {
        let volume: Volume = resolve(volume.into(), Map::new())?;
        volume
            .action(
                self.proxy.session().as_ref(),
                Method::POST,
                "action",
                Some(json!({"os-extend": {"new_size": size}})),
            )
            .await?;
        Ok(())
    }

    /// Wait for a volume's status; see [`wait::wait_for_status`]
    pub async fn wait_for_status(
        &self,
        volume: impl Into<ResourceRef<Volume>>,
        status: &str,
        failures: Option<&[&str]>,
        timeout: Option<Duration>,
    ) -> Result<Volume> {
        let mut volume: Volume = resolve(volume.into(), Map::new())?;
        wait::wait_for_status(
            self.proxy.session().as_ref(),
            &mut volume,
            status,
            failures,
            self.wait_interval,
            timeout,
        )
        .await?;
        Ok(volume)
    }

    pub async fn wait_for_delete(&self, volume: impl Into<ResourceRef<Volume>>, timeout: Option<Duration>) -> Result<()> {
        let mut volume: Volume = resolve(volume.into(), Map::new())?;
        wait::wait_for_delete(self.proxy.session().as_ref(), &mut volume, self.wait_interval, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use crate::session::mock::MockSession;
    use std::sync::Arc;

    fn proxy() -> (Arc<MockSession>, BlockStorageProxy) {
        let session = Arc::new(MockSession::new());
        (session.clone(), BlockStorageProxy::new(session).with_wait_interval(Duration::from_secs(1)))
    }

    #[test]
    fn test_bootable_is_sent_as_string() {
        let mut volume = Volume::new(Map::new());
        volume.set("is_bootable", true).unwrap();
        assert_eq!(volume.body().dirty()["bootable"], json!("true"));
        assert_eq!(volume.get("is_bootable"), json!(true));
    }

    #[tokio::test]
    async fn test_commit_of_bare_id_is_a_no_op() {
        let session = MockSession::new();
        let mut attrs = Map::new();
        attrs.insert("id".into(), json!("v1"));
        let mut volume = Volume::new(attrs.clone());
        volume.commit(&session).await.unwrap();
        assert_eq!(session.request_count(), 0);

        session.push_json(200, json!({"volume": {"id": "v1", "size": 5}}));
        attrs.insert("size".into(), json!(5));
        let mut volume = Volume::new(attrs);
        volume.commit(&session).await.unwrap();
        let requests = session.requests();
        assert_eq!(requests[0].url, "/volumes/v1");
        assert_eq!(requests[0].options.json, Some(json!({"volume": {"size": 5}})));
    }

    #[tokio::test]
    async fn test_create_wraps_body() {
        let (session, proxy) = proxy();
        session.push_json(202, json!({"volume": {"id": "v1", "size": 10, "status": "creating"}}));

        let mut attrs = Map::new();
        attrs.insert("size".into(), json!(10));
        attrs.insert("name".into(), json!("data"));
        let volume = proxy.create_volume(attrs).await.unwrap();

        assert_eq!(volume.get_i64("size"), Some(10));
        let request = &session.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "/volumes");
        assert_eq!(request.options.json, Some(json!({"volume": {"name": "data", "size": 10}})));
    }

    #[tokio::test]
    async fn test_extend_volume() {
        let (session, proxy) = proxy();
        session.push_empty(202);
        proxy.extend_volume("v1", 20).await.unwrap();

        let request = &session.requests()[0];
        assert_eq!(request.url, "/volumes/v1/action");
        assert_eq!(request.options.json, Some(json!({"os-extend": {"new_size": 20}})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_status_by_id() {
        let (session, proxy) = proxy();
        session.push_json(200, json!({"volume": {"id": "v1", "status": "available"}}));
        let volume = proxy
            .wait_for_status("v1", "AVAILABLE", None, Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(volume.get_str("status").as_deref(), Some("available"));
    }

    #[tokio::test]
    async fn test_find_by_name_falls_back_to_listing() {
        let (session, proxy) = proxy();
        session.push_error(404, "");
        session.push_json(200, json!({"volumes": [{"id": "v1", "name": "data"}, {"id": "v2", "name": "logs"}]}));
        session.push_json(200, json!({"volumes": []}));

        let found = proxy.find_volume("logs", false).await.unwrap().unwrap();
        assert_eq!(found.id().as_deref(), Some("v2"));
    }
}
