//! The generic resource: attribute storage plus the CRUD request lifecycle
//!
//! Every operation builds a [`PreparedRequest`] from the dirty attributes,
//! hands it to the session and consumes the response back into the
//! component managers.

use super::component::ComponentManager;
use super::field::Location;
use super::schema::{Schema, UpdateMethod};
use crate::error::{Error, Result};
use crate::session::{RequestOptions, Response, Session};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// URI, body and headers of one outgoing call
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub uri: String,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Resource {
    schema: &'static Schema,
    body: ComponentManager,
    header: ComponentManager,
    uri: ComponentManager,
}

impl Resource {
    /// A not-yet-synchronized resource: every supplied attribute is dirty.
    /// Keys may be client or wire names; unknown keys go to the body.
    pub fn new(schema: &'static Schema, attrs: Map<String, Value>) -> Self {
        Self::build(schema, attrs, false)
    }

    /// A resource mirroring server state: nothing is dirty
    pub fn existing(schema: &'static Schema, attrs: Map<String, Value>) -> Self {
        Self::build(schema, attrs, true)
    }

    /// A clean stub carrying only an identifier
    pub fn with_id(schema: &'static Schema, id: &str) -> Self {
        let mut attrs = Map::new();
        attrs.insert("id".to_string(), Value::String(id.to_string()));
        Self::existing(schema, attrs)
    }

    /// A record as returned by the server, body keys taken verbatim
    pub(crate) fn from_server(
        schema: &'static Schema,
        body: Map<String, Value>,
        uri: Map<String, Value>,
    ) -> Self {
        Self {
            schema,
            body: ComponentManager::new(body, true),
            header: ComponentManager::default(),
            uri: ComponentManager::new(uri, true),
        }
    }

    fn build(schema: &'static Schema, attrs: Map<String, Value>, synchronized: bool) -> Self {
        let mut body = Map::new();
        let mut header = Map::new();
        let mut uri = Map::new();

        for (key, value) in attrs {
            match schema.lookup(&key) {
                Some(field) => {
                    let target = match field.location {
                        Location::Body => &mut body,
                        Location::Header => &mut header,
                        Location::Uri => &mut uri,
                    };
                    target.insert(field.wire.to_string(), value);
                },
                None => {
                    body.insert(key, value);
                },
            }
        }

        Self {
            schema,
            body: ComponentManager::new(body, synchronized),
            header: ComponentManager::new(header, synchronized),
            uri: ComponentManager::new(uri, synchronized),
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn kind(&self) -> &'static str {
        self.schema.kind
    }

    pub fn body(&self) -> &ComponentManager {
        &self.body
    }

    pub fn header(&self) -> &ComponentManager {
        &self.header
    }

    pub fn uri(&self) -> &ComponentManager {
        &self.uri
    }

    fn component(&self, location: Location) -> &ComponentManager {
        match location {
            Location::Body => &self.body,
            Location::Header => &self.header,
            Location::Uri => &self.uri,
        }
    }

    fn component_mut(&mut self, location: Location) -> &mut ComponentManager {
        match location {
            Location::Body => &mut self.body,
            Location::Header => &mut self.header,
            Location::Uri => &mut self.uri,
        }
    }

    // =========================================================================
    // Attribute access
    // =========================================================================

    /// Read an attribute by client name. Undeclared names read the raw body.
    /// Fails when the stored value cannot take the declared type.
    pub fn try_get(&self, name: &str) -> Result<Value> {
        match self.schema.field(name) {
            Some(field) => field.read(self.component(field.location).get(field.wire)),
            None => Ok(self.body.get(name).cloned().unwrap_or(Value::Null)),
        }
    }

    /// [`Resource::try_get`], reading an unconvertible value as null
    pub fn get(&self, name: &str) -> Value {
        self.try_get(name).unwrap_or_else(|e| {
            tracing::warn!("{} {}", self.schema.kind, e);
            Value::Null
        })
    }

    /// String form of an attribute; numbers are rendered, null is `None`
    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).as_bool()
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).as_i64()
    }

    /// Assign an attribute by client name, coercing it to the declared type
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let Some(field) = self.schema.lookup(name).copied() else {
            return Err(Error::InvalidValue(format!(
                "{} has no attribute '{}'",
                self.schema.kind, name
            )));
        };
        let value = field.prepare_write(value.into())?;
        self.component_mut(field.location).set(field.wire, value);
        Ok(())
    }

    /// Remove an attribute; absent attributes are left alone
    pub fn unset(&mut self, name: &str) -> Result<()> {
        let Some(field) = self.schema.lookup(name).copied() else {
            return Err(Error::InvalidValue(format!(
                "{} has no attribute '{}'",
                self.schema.kind, name
            )));
        };
        self.component_mut(field.location).remove(field.wire);
        Ok(())
    }

    /// Apply several assignments
    pub fn update_attrs(&mut self, attrs: Map<String, Value>) -> Result<()> {
        for (name, value) in attrs {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// The identifier, falling back to the alternate id when unset
    pub fn id(&self) -> Option<String> {
        self.get_str("id").or_else(|| {
            self.schema
                .alternate_id()
                .and_then(|field| self.get_str(field.name))
        })
    }

    pub fn name(&self) -> Option<String> {
        self.get_str("name")
    }

    /// Pending body or header changes
    pub fn is_dirty(&self) -> bool {
        self.body.is_dirty() || self.header.is_dirty()
    }

    /// Declared attributes by client name, present values only
    pub fn to_map(&self) -> Map<String, Value> {
        self.schema
            .all_fields()
            .iter()
            .filter(|f| self.component(f.location).contains_key(f.wire))
            .map(|f| (f.name.to_string(), self.get(f.name)))
            .collect()
    }

    // =========================================================================
    // Request construction
    // =========================================================================

    /// Fill `{attr}` placeholders of the base path from URI attributes
    pub(crate) fn collection_path(
        schema: &Schema,
        uri_values: &Map<String, Value>,
    ) -> Result<String> {
        let mut path = String::with_capacity(schema.base_path.len());
        let mut rest = schema.base_path;

        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            let name = &rest[start + 1..start + len];
            let wire = schema
                .field(name)
                .filter(|f| f.location == Location::Uri)
                .map(|f| f.wire)
                .unwrap_or(name);

            let value = match uri_values.get(wire) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => {
                    return Err(Error::InvalidRequest(format!(
                        "{} requires '{}' to build its path",
                        schema.kind, name
                    )))
                },
                Some(other) => other.to_string(),
            };

            path.push_str(&rest[..start]);
            path.push_str(&urlencoding::encode(&value));
            rest = &rest[start + len + 1..];
        }
        path.push_str(rest);

        Ok(path)
    }

    /// Build the URI, body and headers for a call from dirty attributes
    pub fn prepare_request(&self, requires_id: bool, prepend_key: bool) -> Result<PreparedRequest> {
        let body = self.body.dirty();
        let body = match self.schema.resource_key {
            Some(key) if prepend_key => {
                let mut wrapped = Map::new();
                wrapped.insert(key.to_string(), Value::Object(body));
                Value::Object(wrapped)
            },
            _ => Value::Object(body),
        };

        let headers = self
            .header
            .dirty()
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                Value::Null => (k, String::new()),
                other => (k, other.to_string()),
            })
            .collect();

        let mut uri = Self::collection_path(self.schema, self.uri.attributes())?;
        if requires_id {
            let Some(id) = self.id() else {
                return Err(Error::InvalidRequest(format!(
                    "{} requires an id for this request",
                    self.schema.kind
                )));
            };
            uri = format!("{}/{}", uri.trim_end_matches('/'), urlencoding::encode(&id));
        }

        Ok(PreparedRequest {
            uri,
            body: Some(body),
            headers,
        })
    }

    /// Wire name of the `id` attribute
    fn id_wire(&self) -> &'static str {
        self.schema.field("id").map(|f| f.wire).unwrap_or("id")
    }

    /// Whether an update has anything to send; the id is never an update
    fn has_pending_update(&self) -> bool {
        let id_wire = self.id_wire();
        self.header.is_dirty() || self.body.dirty_keys().iter().any(|k| k != id_wire)
    }

    /// RFC 6902 document for the pending body changes; the id never changes
    fn json_patch(&self) -> Value {
        let id_wire = self.id_wire();
        let removed = self.body.removed_keys();
        let ops: Vec<Value> = self
            .body
            .dirty()
            .into_iter()
            .filter(|(key, _)| key != id_wire)
            .map(|(key, value)| {
                if removed.contains(&key) {
                    json!({"op": "remove", "path": format!("/{}", key)})
                } else {
                    json!({"op": "add", "path": format!("/{}", key), "value": value})
                }
            })
            .collect();
        Value::Array(ops)
    }

    pub(crate) fn request_options(&self) -> RequestOptions {
        options_for(self.schema)
    }

    fn check_allowed(&self, allowed: bool, method: &'static str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(Error::MethodNotSupported {
                resource: self.schema.kind,
                method,
            })
        }
    }

    // =========================================================================
    // Response consumption
    // =========================================================================

    /// Merge a successful response into the attribute groups and mark them clean
    fn translate_response(&mut self, response: &Response, has_body: bool) {
        if has_body {
            if let Some(ref body) = response.body {
                let body = match self.schema.resource_key {
                    Some(key) => body.get(key).unwrap_or(body),
                    None => body,
                };
                if let Value::Object(map) = body {
                    self.body.update_synchronized(map.clone());
                }
            }
            self.body.clean();
        }

        let headers: Map<String, Value> = self
            .schema
            .fields_in(Location::Header)
            .filter_map(|field| {
                response
                    .header(field.wire)
                    .map(|v| (field.wire.to_string(), Value::String(v.to_string())))
            })
            .collect();
        self.header.update_synchronized(headers);
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// POST to the collection, or PUT to the item path when the id is already known
    pub async fn create(&mut self, session: &dyn Session) -> Result<()> {
        self.check_allowed(self.schema.allow.create, "create")?;

        let requires_id = self.id().is_some();
        let request = self.prepare_request(requires_id, true)?;
        let method = if requires_id { Method::PUT } else { Method::POST };

        tracing::debug!("create {} via {} {}", self.schema.kind, method, request.uri);

        let mut options = self.request_options();
        options.headers = request.headers;
        options.json = request.body;

        let response = session.request(method, &request.uri, options).await?;
        self.translate_response(&response, true);
        Ok(())
    }

    /// GET the item path
    pub async fn fetch(&mut self, session: &dyn Session) -> Result<()> {
        self.check_allowed(self.schema.allow.fetch, "fetch")?;

        let request = self.prepare_request(true, false)?;
        let response = session.get(&request.uri, self.request_options()).await?;
        self.translate_response(&response, true);
        Ok(())
    }

    /// HEAD the item path, consuming headers only
    pub async fn head(&mut self, session: &dyn Session) -> Result<()> {
        self.check_allowed(self.schema.allow.head, "head")?;

        let request = self.prepare_request(true, false)?;
        let options = self.request_options().header("Accept", "");
        let response = session.head(&request.uri, options).await?;
        self.translate_response(&response, false);
        Ok(())
    }

    /// Send pending changes. Without any, nothing is sent.
    pub async fn commit(&mut self, session: &dyn Session) -> Result<()> {
        if !self.has_pending_update() {
            return Ok(());
        }
        self.check_allowed(self.schema.allow.commit, "commit")?;

        let mut request = self.prepare_request(true, true)?;
        if let Some(ref mut body) = request.body {
            let fields = match self.schema.resource_key {
                Some(key) => body.get_mut(key),
                None => Some(body),
            };
            if let Some(Value::Object(fields)) = fields {
                fields.remove(self.id_wire());
            }
        }
        let mut options = self.request_options();
        options.headers = request.headers;

        let method = match self.schema.update_method {
            UpdateMethod::Put => {
                options.json = request.body;
                Method::PUT
            },
            UpdateMethod::PatchMerge => {
                options.json = request.body;
                Method::PATCH
            },
            UpdateMethod::PatchJson => {
                options.json = Some(self.json_patch());
                Method::PATCH
            },
        };

        tracing::debug!("commit {} via {} {}", self.schema.kind, method, request.uri);

        let response = session.request(method, &request.uri, options).await?;
        self.translate_response(&response, true);
        Ok(())
    }

    /// DELETE the item path
    pub async fn delete(&mut self, session: &dyn Session) -> Result<()> {
        self.check_allowed(self.schema.allow.delete, "delete")?;

        let request = self.prepare_request(true, false)?;
        let options = self.request_options().header("Accept", "");
        let response = session.delete(&request.uri, options).await?;
        self.translate_response(&response, false);
        Ok(())
    }

    /// Call `<item path>/<suffix>`; the response is returned as-is
    pub async fn action(
        &self,
        session: &dyn Session,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<Response> {
        let request = self.prepare_request(true, false)?;
        let url = format!("{}/{}", request.uri, suffix.trim_start_matches('/'));

        tracing::info!("{} {} on {}", method, suffix, self.schema.kind);

        let mut options = self.request_options();
        options.json = body;
        session.request(method, &url, options).await
    }
}

/// Session options derived from a schema
pub(crate) fn options_for(schema: &Schema) -> RequestOptions {
    RequestOptions {
        service: Some(schema.service.to_string()),
        microversion: schema.microversion.map(str::to_string),
        retriable_status_codes: schema.retriable_status_codes.to_vec(),
        ..Default::default()
    }
}
