//! stacksdk - client SDK for OpenStack-style control-plane APIs
//!
//! Local resource objects mirror remote entities: attributes are mapped
//! between client and wire names, changes are tracked so only dirty
//! values are sent, listings are paginated lazily and long-running
//! operations are awaited with fixed-interval polling.
//!
//! # Module Structure
//!
//! - [`config`] - `clouds.yaml` loading
//! - [`error`] - error taxonomy
//! - [`resource`] - the generic resource engine
//! - [`proxy`] - id/instance resolution and CRUD helpers shared by services
//! - [`services`] - per-service resources and proxies
//! - [`session`] - transport contract, HTTP and mock sessions, `CloudClient`
//! - [`wait`] - polling helpers

pub mod config;
pub mod error;
pub mod proxy;
pub mod resource;
pub mod services;
pub mod session;
pub mod wait;

pub use error::{Error, Result};
pub use session::client::CloudClient;
