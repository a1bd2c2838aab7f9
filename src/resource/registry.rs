//! Resource Registry
//!
//! Lookup table from a type name (`baremetal.node`, `volume.volume`, ...)
//! to its schema, for callers that only know the type at runtime.

use super::schema::Schema;
use super::ResourceType;
use crate::services::{auto_scaling, baremetal, block_storage, ecs, introspection, load_balancer, message_queue};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Registered resource types
#[derive(Debug, Clone, Copy)]
pub struct ResourceEntry {
    pub kind: &'static str,
    pub display_name: &'static str,
    pub schema: &'static Schema,
}

fn entry<T: ResourceType>(display_name: &'static str) -> ResourceEntry {
    let schema = T::schema();
    ResourceEntry {
        kind: schema.kind,
        display_name,
        schema,
    }
}

/// Global registry
static REGISTRY: OnceLock<BTreeMap<&'static str, ResourceEntry>> = OnceLock::new();

/// Get the resource registry (built on first access)
pub fn get_registry() -> &'static BTreeMap<&'static str, ResourceEntry> {
    REGISTRY.get_or_init(|| {
        [
            entry::<baremetal::Node>("Bare Metal Nodes"),
            entry::<baremetal::Port>("Bare Metal Ports"),
            entry::<baremetal::Allocation>("Bare Metal Allocations"),
            entry::<introspection::Introspection>("Introspections"),
            entry::<block_storage::Volume>("Volumes"),
            entry::<load_balancer::LoadBalancer>("Load Balancers"),
            entry::<auto_scaling::ScalingConfiguration>("Scaling Configurations"),
            entry::<auto_scaling::ScalingGroup>("Scaling Groups"),
            entry::<auto_scaling::ScalingInstance>("Scaling Instances"),
            entry::<message_queue::Queue>("Queues"),
            entry::<ecs::Job>("Jobs"),
        ]
        .into_iter()
        .map(|e| (e.kind, e))
        .collect()
    })
}

/// Get a resource entry by type name
pub fn get_resource(kind: &str) -> Option<&'static ResourceEntry> {
    get_registry().get(kind)
}

/// Get the schema of a type name
pub fn get_schema(kind: &str) -> Option<&'static Schema> {
    get_resource(kind).map(|e| e.schema)
}

/// All registered type names, sorted
pub fn get_all_resource_kinds() -> Vec<&'static str> {
    get_registry().keys().copied().collect()
}
