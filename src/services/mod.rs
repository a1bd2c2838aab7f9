//! Per-service resources and proxies
//!
//! Each service module declares its resource schemas and a proxy type that
//! wraps the generic [`Proxy`](crate::proxy::Proxy) with named operations.
//! [`CloudClient`](crate::session::client::CloudClient) hands the proxies out.

pub mod auto_scaling;
pub mod baremetal;
pub mod block_storage;
pub mod ecs;
pub mod introspection;
pub mod load_balancer;
pub mod message_queue;
