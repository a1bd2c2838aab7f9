//! Generic proxy helpers
//!
//! Service proxies delegate to [`Proxy`], which turns "an id, an instance or
//! nothing" into a typed resource and runs the matching CRUD call.

use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceType};
use crate::session::SessionRef;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// What a proxy call operates on
#[derive(Debug, Clone)]
pub enum ResourceRef<T> {
    /// A brand-new bare resource
    New,
    /// A stub carrying just this id
    Id(String),
    /// A typed instance, used as-is
    Instance(T),
    /// A generic resource; its schema must match the expected type
    Untyped(Resource),
}

impl<T> From<&str> for ResourceRef<T> {
    fn from(id: &str) -> Self {
        ResourceRef::Id(id.to_string())
    }
}

impl<T> From<String> for ResourceRef<T> {
    fn from(id: String) -> Self {
        ResourceRef::Id(id)
    }
}

impl<T> From<&String> for ResourceRef<T> {
    fn from(id: &String) -> Self {
        ResourceRef::Id(id.clone())
    }
}

impl<T: ResourceType> From<T> for ResourceRef<T> {
    fn from(instance: T) -> Self {
        ResourceRef::Instance(instance)
    }
}

/// Build the typed resource a call operates on, applying `attrs` as changes
pub fn resolve<T: ResourceType>(value: ResourceRef<T>, attrs: Map<String, Value>) -> Result<T> {
    let mut resource = match value {
        ResourceRef::New => return Ok(T::new(attrs)),
        ResourceRef::Id(id) => T::with_id(&id),
        ResourceRef::Instance(instance) => instance,
        ResourceRef::Untyped(resource) => {
            let expected = T::schema().kind;
            if resource.kind() != expected {
                return Err(Error::InvalidValue(format!(
                    "expected a {} resource, got {}",
                    expected,
                    resource.kind()
                )));
            }
            T::from_resource(resource)
        },
    };
    resource.as_resource_mut().update_attrs(attrs)?;
    Ok(resource)
}

fn not_found<T: ResourceType>(id: Option<String>, error: Error) -> Error {
    match error {
        Error::NotFound(details) => Error::ResourceNotFound {
            message: format!(
                "No {} found for {}",
                T::schema().kind,
                id.unwrap_or_else(|| "<no id>".to_string())
            ),
            details: Some(details),
        },
        other => other,
    }
}

/// Generic CRUD helpers shared by service proxies
#[derive(Clone)]
pub struct Proxy {
    session: SessionRef,
}

impl Proxy {
    pub fn new(session: SessionRef) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    /// Create a resource from attributes
    pub async fn create<T: ResourceType>(&self, attrs: Map<String, Value>) -> Result<T> {
        let mut resource = T::new(attrs);
        resource.as_resource_mut().create(self.session.as_ref()).await?;
        Ok(resource)
    }

    /// Fetch a resource; not-found becomes `ResourceNotFound`
    pub async fn get<T: ResourceType>(&self, value: impl Into<ResourceRef<T>>) -> Result<T> {
        let mut resource = resolve(value.into(), Map::new())?;
        let id = resource.as_resource().id();
        resource
            .as_resource_mut()
            .fetch(self.session.as_ref())
            .await
            .map_err(|e| not_found::<T>(id, e))?;
        Ok(resource)
    }

    /// Apply `attrs` and send the pending changes
    pub async fn update<T: ResourceType>(
        &self,
        value: impl Into<ResourceRef<T>>,
        attrs: Map<String, Value>,
    ) -> Result<T> {
        let mut resource = resolve(value.into(), attrs)?;
        resource.as_resource_mut().commit(self.session.as_ref()).await?;
        Ok(resource)
    }

    /// Delete a resource. A missing resource yields `Ok(None)` when
    /// `ignore_missing`, `ResourceNotFound` otherwise.
    pub async fn delete<T: ResourceType>(
        &self,
        value: impl Into<ResourceRef<T>>,
        ignore_missing: bool,
    ) -> Result<Option<T>> {
        let mut resource = resolve(value.into(), Map::new())?;
        let result = resource.as_resource_mut().delete(self.session.as_ref()).await;
        match result {
            Ok(()) => Ok(Some(resource)),
            Err(Error::NotFound(_)) if ignore_missing => Ok(None),
            Err(e) => Err(not_found::<T>(resource.as_resource().id(), e)),
        }
    }

    /// HEAD a resource
    pub async fn head<T: ResourceType>(&self, value: impl Into<ResourceRef<T>>) -> Result<T> {
        let mut resource = resolve(value.into(), Map::new())?;
        resource.as_resource_mut().head(self.session.as_ref()).await?;
        Ok(resource)
    }

    /// Stream resources of a type
    pub fn list<T: ResourceType>(
        &self,
        params: BTreeMap<String, Value>,
        paginated: bool,
    ) -> Result<BoxStream<'static, Result<T>>> {
        let stream = Resource::list(self.session.clone(), T::schema(), params, paginated)?;
        Ok(stream.map_ok(T::from_resource).boxed())
    }

    /// Collect every resource of a type
    pub async fn list_all<T: ResourceType>(&self, params: BTreeMap<String, Value>) -> Result<Vec<T>> {
        self.list(params, true)?.try_collect().await
    }

    /// Find by name or id
    pub async fn find<T: ResourceType>(
        &self,
        name_or_id: &str,
        ignore_missing: bool,
        params: BTreeMap<String, Value>,
    ) -> Result<Option<T>> {
        let found = Resource::find(
            self.session.clone(),
            T::schema(),
            name_or_id,
            ignore_missing,
            params,
        )
        .await?;
        Ok(found.map(T::from_resource))
    }
}

/// Build a parameter map from `(name, value)` pairs
pub fn params<I, K, V>(pairs: I) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::baremetal::{Node, Port};
    use crate::services::block_storage::Volume;
    use crate::session::mock::MockSession;
    use serde_json::json;
    use std::sync::Arc;

    fn proxy() -> (Arc<MockSession>, Proxy) {
        let session = Arc::new(MockSession::new());
        (session.clone(), Proxy::new(session))
    }

    #[test]
    fn test_resolve_id_builds_clean_stub() {
        let node: Node = resolve("n1".into(), Map::new()).unwrap();
        assert_eq!(node.id().as_deref(), Some("n1"));
        assert!(!node.is_dirty());
    }

    #[test]
    fn test_resolve_rejects_incompatible_untyped_resource() {
        let volume = Volume::with_id("v1").into_resource();
        let result: Result<Node> = resolve(ResourceRef::Untyped(volume), Map::new());
        assert!(matches!(result, Err(Error::InvalidValue(_))));
    }

    #[test]
    fn test_resolve_instance_applies_attrs() {
        let port = Port::with_id("p1");
        let mut attrs = Map::new();
        attrs.insert("address".into(), json!("52:54:00:00:00:01"));
        let port: Port = resolve(port.into(), attrs).unwrap();
        assert!(port.is_dirty());
    }

    #[tokio::test]
    async fn test_get_translates_not_found() {
        let (session, proxy) = proxy();
        session.push_error(404, r#"{"error_message": "{\"faultstring\": \"Node n1 could not be found.\"}"}"#);

        let err = proxy.get::<Node>("n1").await.unwrap_err();
        match err {
            Error::ResourceNotFound { message, details } => {
                assert!(message.contains("baremetal.node"));
                assert_eq!(details.unwrap().message, "Node n1 could not be found.");
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_ignore_missing() {
        let (session, proxy) = proxy();
        session.push_error(404, "");
        let deleted = proxy.delete::<Volume>("v1", true).await.unwrap();
        assert!(deleted.is_none());

        session.push_error(404, "");
        let err = proxy.delete::<Volume>("v1", false).await.unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { details: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_delete_other_errors_propagate() {
        let (session, proxy) = proxy();
        session.push_error(409, "in use");
        let err = proxy.delete::<Volume>("v1", true).await.unwrap_err();
        assert_eq!(err.status_code(), Some(409));
    }

    #[tokio::test]
    async fn test_update_without_changes_is_noop() {
        let (session, proxy) = proxy();
        let volume = proxy.update::<Volume>("v1", Map::new()).await.unwrap();
        assert_eq!(volume.id().as_deref(), Some("v1"));
        assert_eq!(session.request_count(), 0);
    }

    #[tokio::test]
    async fn test_get_new_resource_needs_id() {
        let (session, proxy) = proxy();
        let err = proxy.get::<Volume>(ResourceRef::New).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(session.request_count(), 0);
    }

    #[test]
    fn test_params_helper() {
        let p = params([("limit", json!(5)), ("name", json!("x"))]);
        assert_eq!(p.len(), 2);
        assert_eq!(p["limit"], json!(5));
    }
}
