//! Listing with marker/limit pagination, and find-by-name-or-id
//!
//! The marker is the id of the last item yielded; the limit of a follow-up
//! request is the number of items the previous page yielded. A page shorter
//! than the requested limit is taken as the last one: this assumes the
//! service always fills pages up to the limit when more data exists.

use super::base::{options_for, Resource};
use super::field::Location;
use super::schema::Schema;
use crate::error::{Error, Result};
use crate::session::SessionRef;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};

/// Stream of listed resources
pub type ListStream = BoxStream<'static, Result<Resource>>;

/// State carried between pages
struct Pager {
    session: SessionRef,
    schema: &'static Schema,
    path: String,
    query: Vec<(String, String)>,
    uri_values: Map<String, Value>,
    paginated: bool,
    limit: Option<u64>,
    marker: Option<String>,
    buffer: VecDeque<Value>,
    yielded: u64,
    started: bool,
    done: bool,
}

impl Pager {
    /// Whether another request is needed after the current page ran dry
    fn wants_next_page(&self) -> bool {
        if !self.started {
            return true;
        }
        if !self.paginated || self.yielded == 0 {
            return false;
        }
        // Short page: nothing left on the server
        !matches!(self.limit, Some(limit) if self.yielded < limit)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        if self.started {
            self.limit = Some(self.yielded);
        }

        let mut params = self.query.clone();
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(ref marker) = self.marker {
            params.push(("marker".to_string(), marker.clone()));
        }

        let mut options = options_for(self.schema);
        options.params = params;

        tracing::debug!("list {} page at marker {:?}", self.schema.kind, self.marker);

        let response = self.session.get(&self.path, options).await?;
        let body = response.json();
        let items = match self.schema.resources_key {
            Some(key) => body.get(key).cloned().unwrap_or(Value::Null),
            None => body,
        };

        self.buffer = match items {
            Value::Array(items) => items.into(),
            _ => VecDeque::new(),
        };
        self.yielded = 0;
        self.started = true;
        Ok(())
    }

    async fn next_item(mut self) -> Result<Option<(Resource, Self)>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                let Value::Object(body) = item else {
                    continue;
                };
                let resource = Resource::from_server(self.schema, body, self.uri_values.clone());
                self.marker = resource.id();
                self.yielded += 1;
                return Ok(Some((resource, self)));
            }

            if self.done || !self.wants_next_page() {
                self.done = true;
                return Ok(None);
            }

            self.fetch_page().await?;
        }
    }
}

impl Resource {
    /// List resources of a type.
    ///
    /// Params naming URI attributes fill the base path, the rest go through
    /// the schema's query mapping. Precondition failures (listing not
    /// allowed, unknown parameter, unfilled path) are returned before any
    /// request is made.
    pub fn list(
        session: SessionRef,
        schema: &'static Schema,
        params: BTreeMap<String, Value>,
        paginated: bool,
    ) -> Result<ListStream> {
        if !schema.allow.list {
            return Err(Error::MethodNotSupported {
                resource: schema.kind,
                method: "list",
            });
        }

        let mut uri_values = Map::new();
        let mut query_params = BTreeMap::new();
        for (name, value) in params {
            match schema.field(&name).filter(|f| f.location == Location::Uri) {
                Some(field) => {
                    uri_values.insert(field.wire.to_string(), value);
                },
                None => {
                    query_params.insert(name, value);
                },
            }
        }

        let limit = query_params
            .remove("limit")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));
        let marker = query_params
            .remove("marker")
            .and_then(|v| v.as_str().map(str::to_string));

        let pager = Pager {
            session,
            schema,
            path: Self::collection_path(schema, &uri_values)?,
            query: schema.query.transpose(&query_params)?,
            uri_values,
            paginated,
            limit,
            marker,
            buffer: VecDeque::new(),
            yielded: 0,
            started: false,
            done: false,
        };

        Ok(stream::try_unfold(pager, Pager::next_item).boxed())
    }

    /// Collect a whole listing
    pub async fn list_all(
        session: SessionRef,
        schema: &'static Schema,
        params: BTreeMap<String, Value>,
    ) -> Result<Vec<Resource>> {
        Self::list(session, schema, params, true)?.try_collect().await
    }

    /// Find one resource by id or name.
    ///
    /// A direct fetch by id is tried first; on not-found the listing is
    /// scanned for exactly one item whose id or name matches.
    pub async fn find(
        session: SessionRef,
        schema: &'static Schema,
        name_or_id: &str,
        ignore_missing: bool,
        params: BTreeMap<String, Value>,
    ) -> Result<Option<Resource>> {
        if schema.allow.fetch {
            let mut attrs: Map<String, Value> = params
                .iter()
                .filter(|(name, _)| {
                    schema
                        .field(name)
                        .is_some_and(|f| f.location == Location::Uri)
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            attrs.insert("id".to_string(), Value::String(name_or_id.to_string()));

            let mut candidate = Resource::existing(schema, attrs);
            match candidate.fetch(session.as_ref()).await {
                Ok(()) => return Ok(Some(candidate)),
                // Some services answer 400 for a name where a UUID is expected
                Err(e) if e.is_not_found() || e.status_code() == Some(400) => {
                    tracing::debug!("{} {} not found by id, listing", schema.kind, name_or_id);
                },
                Err(e) => return Err(e),
            }
        }

        let mut found = None;
        if schema.allow.list {
            let mut items = Self::list(session, schema, params, true)?;
            while let Some(item) = items.try_next().await? {
                let matches = item.id().as_deref() == Some(name_or_id)
                    || item.name().as_deref() == Some(name_or_id);
                if !matches {
                    continue;
                }
                if found.is_some() {
                    return Err(Error::DuplicateResource {
                        resource: schema.kind,
                        query: name_or_id.to_string(),
                    });
                }
                found = Some(item);
            }
        }

        match found {
            Some(item) => Ok(Some(item)),
            None if ignore_missing => Ok(None),
            None => Err(Error::ResourceNotFound {
                message: format!("No {} found for {}", schema.kind, name_or_id),
                details: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::field::Field;
    use crate::resource::query::QueryMapping;
    use crate::session::mock::MockSession;
    use serde_json::json;
    use std::sync::{Arc, OnceLock};

    fn gadget_schema() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::new("test.gadget", "test", "/gadgets")
                .resources_key("gadgets")
                .query(QueryMapping::new(&["name"]).rename("is_shiny", "shiny"))
                .fields(vec![Field::body("is_shiny", "shiny")])
        })
    }

    fn page(ids: std::ops::Range<usize>) -> Value {
        let items: Vec<Value> = ids
            .map(|i| json!({"id": format!("g{}", i), "name": format!("gadget-{}", i)}))
            .collect();
        json!({ "gadgets": items })
    }

    #[tokio::test]
    async fn test_pagination_stops_on_short_page() {
        let session = Arc::new(MockSession::new());
        session.push_json(200, page(0..3));
        session.push_json(200, page(3..6));
        session.push_json(200, page(6..7));

        let items = Resource::list_all(session.clone(), gadget_schema(), BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 7);
        assert_eq!(session.request_count(), 3);

        let requests = session.requests();
        assert_eq!(requests[0].param("limit"), None);
        assert_eq!(requests[1].param("limit"), Some("3"));
        assert_eq!(requests[1].param("marker"), Some("g2"));
        assert_eq!(requests[2].param("marker"), Some("g5"));
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let session = Arc::new(MockSession::new());
        session.push_json(200, page(0..4));
        session.push_json(200, page(0..0));

        let items = Resource::list_all(session.clone(), gadget_schema(), BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(session.request_count(), 2);
    }

    #[tokio::test]
    async fn test_unpaginated_reads_one_page() {
        let session = Arc::new(MockSession::new());
        session.push_json(200, page(0..5));

        let items: Vec<Resource> = Resource::list(session.clone(), gadget_schema(), BTreeMap::new(), false)
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(session.request_count(), 1);
        assert!(!items[0].is_dirty());
    }

    #[tokio::test]
    async fn test_list_transposes_query() {
        let session = Arc::new(MockSession::new());
        session.push_json(200, page(0..0));

        let mut params = BTreeMap::new();
        params.insert("is_shiny".to_string(), json!(true));
        let _ = Resource::list_all(session.clone(), gadget_schema(), params).await.unwrap();
        assert_eq!(session.requests()[0].param("shiny"), Some("true"));
    }

    #[test]
    fn test_list_rejects_unknown_param_before_io() {
        let session = Arc::new(MockSession::new());
        let mut params = BTreeMap::new();
        params.insert("colour".to_string(), json!("red"));
        assert!(matches!(
            Resource::list(session.clone(), gadget_schema(), params, true),
            Err(Error::InvalidRequest(_))
        ));
        assert_eq!(session.request_count(), 0);
    }

    #[tokio::test]
    async fn test_find_by_id_uses_direct_fetch() {
        let session = Arc::new(MockSession::new());
        session.push_json(200, json!({"id": "g1", "name": "one"}));

        let found = Resource::find(session.clone(), gadget_schema(), "g1", false, BTreeMap::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name().as_deref(), Some("one"));
        assert_eq!(session.request_count(), 1);
    }

    #[tokio::test]
    async fn test_find_duplicate_names() {
        let session = Arc::new(MockSession::new());
        session.push_error(404, "");
        session.push_json(200, json!({"gadgets": [{"id": "x", "name": "a"}, {"id": "y", "name": "a"}]}));
        session.push_json(200, json!({"gadgets": []}));

        let err = Resource::find(session.clone(), gadget_schema(), "a", false, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateResource { .. }));
    }

    #[tokio::test]
    async fn test_find_missing() {
        let session = Arc::new(MockSession::new());
        session.push_error(404, "");
        session.push_json(200, json!({"gadgets": []}));
        let found = Resource::find(session.clone(), gadget_schema(), "nope", true, BTreeMap::new())
            .await
            .unwrap();
        assert!(found.is_none());

        session.push_error(404, "");
        session.push_json(200, json!({"gadgets": []}));
        let err = Resource::find(session.clone(), gadget_schema(), "nope", false, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { .. }));
    }

    #[test]
    fn test_list_rejected_when_not_allowed() {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        let schema = SCHEMA.get_or_init(|| {
            Schema::new("test.unlisted", "test", "/unlisted")
                .allow(crate::resource::schema::Capabilities {
                    list: false,
                    ..crate::resource::schema::Capabilities::CRUD
                })
                .fields(vec![Field::body("name", "name")])
        });

        let session = Arc::new(MockSession::new());
        let err = Resource::list(session.clone(), schema, BTreeMap::new(), true)
            .err()
            .unwrap();
        assert!(matches!(err, Error::MethodNotSupported { method: "list", .. }));
        assert_eq!(session.request_count(), 0);
    }
}
