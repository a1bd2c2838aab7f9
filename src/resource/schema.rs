//! Static per-type resource schema
//!
//! Each resource type declares its schema once: REST base path, JSON
//! envelope keys, capabilities, update style and the full field table
//! (base fields merged with the type's own declarations).

use super::field::{Field, Location};
use super::query::QueryMapping;

/// Verbs a resource type allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub create: bool,
    pub fetch: bool,
    pub commit: bool,
    pub delete: bool,
    pub list: bool,
    pub head: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        create: false,
        fetch: false,
        commit: false,
        delete: false,
        list: false,
        head: false,
    };

    /// Everything except HEAD, which few services implement
    pub const CRUD: Self = Self {
        create: true,
        fetch: true,
        commit: true,
        delete: true,
        list: true,
        head: false,
    };

    pub const READ_ONLY: Self = Self {
        fetch: true,
        list: true,
        ..Self::NONE
    };
}

/// How `commit` sends pending changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    /// PUT with the dirty body
    Put,
    /// PATCH with the dirty body
    PatchMerge,
    /// PATCH with an RFC 6902 document
    PatchJson,
}

/// Fields every resource carries unless it redeclares them
fn base_fields() -> Vec<Field> {
    vec![Field::body("id", "id"), Field::body("name", "name")]
}

#[derive(Debug)]
pub struct Schema {
    /// Unique type name, e.g. `baremetal.node`
    pub kind: &'static str,
    /// Service type used to select the endpoint
    pub service: &'static str,
    /// Collection path, may contain `{attr}` placeholders filled from URI attributes
    pub base_path: &'static str,
    pub resource_key: Option<&'static str>,
    pub resources_key: Option<&'static str>,
    pub allow: Capabilities,
    pub update_method: UpdateMethod,
    pub microversion: Option<&'static str>,
    pub retriable_status_codes: &'static [u16],
    pub query: QueryMapping,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(kind: &'static str, service: &'static str, base_path: &'static str) -> Self {
        Self {
            kind,
            service,
            base_path,
            resource_key: None,
            resources_key: None,
            allow: Capabilities::CRUD,
            update_method: UpdateMethod::Put,
            microversion: None,
            retriable_status_codes: &[],
            query: QueryMapping::new(&[]),
            fields: base_fields(),
        }
    }

    pub fn resource_key(mut self, key: &'static str) -> Self {
        self.resource_key = Some(key);
        self
    }

    pub fn resources_key(mut self, key: &'static str) -> Self {
        self.resources_key = Some(key);
        self
    }

    pub fn allow(mut self, allow: Capabilities) -> Self {
        self.allow = allow;
        self
    }

    pub fn update_method(mut self, method: UpdateMethod) -> Self {
        self.update_method = method;
        self
    }

    pub fn microversion(mut self, version: &'static str) -> Self {
        self.microversion = Some(version);
        self
    }

    pub fn retriable_status_codes(mut self, codes: &'static [u16]) -> Self {
        self.retriable_status_codes = codes;
        self
    }

    pub fn query(mut self, query: QueryMapping) -> Self {
        self.query = query;
        self
    }

    /// Merge declared fields over the inherited ones; a redeclared
    /// name replaces the inherited field.
    pub fn fields(mut self, fields: Vec<Field>) -> Self {
        for field in fields {
            match self.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field,
                None => self.fields.push(field),
            }
        }
        let alternates = self.fields.iter().filter(|f| f.alternate_id).count();
        assert!(
            alternates <= 1,
            "{} declares {} alternate id fields, at most one is allowed",
            self.kind,
            alternates
        );
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field addressed by client or wire name, client name first
    pub fn lookup(&self, name: &str) -> Option<&Field> {
        self.field(name)
            .or_else(|| self.fields.iter().find(|f| f.wire == name))
    }

    pub fn alternate_id(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.alternate_id)
    }

    pub fn all_fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_in(&self, location: Location) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.location == location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_fields_present() {
        let schema = Schema::new("test.thing", "test", "/things");
        assert_eq!(schema.field("id").unwrap().wire, "id");
        assert_eq!(schema.field("name").unwrap().wire, "name");
    }

    #[test]
    fn test_redeclared_field_overrides_base() {
        let schema = Schema::new("test.thing", "test", "/things")
            .fields(vec![Field::body("id", "uuid"), Field::body("owner", "owner")]);
        assert_eq!(schema.field("id").unwrap().wire, "uuid");
        assert_eq!(schema.all_fields().len(), 3);
        assert_eq!(schema.lookup("uuid").unwrap().name, "id");
    }

    #[test]
    #[should_panic(expected = "at most one is allowed")]
    fn test_two_alternate_ids_rejected() {
        let _ = Schema::new("test.thing", "test", "/things").fields(vec![
            Field::body("name", "name").alternate_id(),
            Field::body("slug", "slug").alternate_id(),
        ]);
    }
}
