//! Resource abstraction layer
//!
//! A [`Resource`] is the local copy of one remote entity. Its attributes
//! live in three [`ComponentManager`]s (body, header, uri) keyed by wire
//! name, described by a static per-type [`Schema`].
//!
//! # Architecture
//!
//! - [`component`] - value storage with dirty tracking
//! - [`field`] - attribute descriptors and coercions
//! - [`query`] - client -> server query parameter names
//! - [`schema`] - per-type path, envelope keys, capabilities and field table
//! - [`base`] - request construction, response consumption, CRUD
//! - [`pagination`] - marker/limit listing and find
//! - [`registry`] - schema lookup by type name
//!
//! Typed resources (`Node`, `Volume`, ...) are thin wrappers implementing
//! [`ResourceType`] and dereferencing to [`Resource`].
//!
//! # Example
//!
//! ```ignore
//! use stacksdk::resource::ResourceType;
//! use stacksdk::services::block_storage::Volume;
//!
//! async fn grow(session: &dyn stacksdk::session::Session) -> stacksdk::Result<()> {
//!     let mut volume = Volume::with_id("vol-1");
//!     volume.fetch(session).await?;
//!     volume.set("size", 20)?;
//!     volume.commit(session).await
//! }
//! ```

pub mod base;
pub mod component;
pub mod field;
pub mod pagination;
pub mod query;
pub mod registry;
pub mod schema;

pub use base::{PreparedRequest, Resource};
pub use component::ComponentManager;
pub use field::{BoolStr, Coercion, Field, FieldDefault, Formatter, Location, Timestamp};
pub use pagination::ListStream;
pub use query::QueryMapping;
pub use schema::{Capabilities, Schema, UpdateMethod};

use serde_json::{Map, Value};

/// A statically typed resource backed by a generic [`Resource`]
pub trait ResourceType: Sized + Send + Sync + 'static {
    fn schema() -> &'static Schema;

    fn from_resource(resource: Resource) -> Self;

    fn as_resource(&self) -> &Resource;

    fn as_resource_mut(&mut self) -> &mut Resource;

    fn into_resource(self) -> Resource;

    /// Unsynchronized instance; every attribute is dirty
    fn new(attrs: Map<String, Value>) -> Self {
        Self::from_resource(Resource::new(Self::schema(), attrs))
    }

    /// Instance mirroring server state
    fn existing(attrs: Map<String, Value>) -> Self {
        Self::from_resource(Resource::existing(Self::schema(), attrs))
    }

    /// Clean stub carrying only an id
    fn with_id(id: &str) -> Self {
        Self::from_resource(Resource::with_id(Self::schema(), id))
    }
}

/// Declare a typed wrapper around [`Resource`] for a schema function
macro_rules! resource_type {
    ($(#[$meta:meta])* $name:ident => $schema:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name($crate::resource::Resource);

        impl $crate::resource::ResourceType for $name {
            fn schema() -> &'static $crate::resource::Schema {
                $schema()
            }

            fn from_resource(resource: $crate::resource::Resource) -> Self {
                Self(resource)
            }

            fn as_resource(&self) -> &$crate::resource::Resource {
                &self.0
            }

            fn as_resource_mut(&mut self) -> &mut $crate::resource::Resource {
                &mut self.0
            }

            fn into_resource(self) -> $crate::resource::Resource {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = $crate::resource::Resource;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
    };
}

pub(crate) use resource_type;
