//! Bare metal provisioning service
//!
//! Every resource of this service is pinned to one API microversion and
//! retries on 409 (node locked by a conductor) and 503.

mod allocation;
mod node;
mod port;
mod proxy;

pub use allocation::Allocation;
pub use node::{expected_power_state, expected_provision_state, Node, ProvisionRequest};
pub use port::Port;
pub use proxy::{BaremetalProxy, WaitResult};

use crate::resource::Schema;

pub const SERVICE_TYPE: &str = "baremetal";

pub const MICROVERSION: &str = "1.52";

pub const RETRIABLE_STATUS_CODES: &[u16] = &[409, 503];

fn schema_for(kind: &'static str, base_path: &'static str, resources_key: &'static str) -> Schema {
    Schema::new(kind, SERVICE_TYPE, base_path)
        .resources_key(resources_key)
        .microversion(MICROVERSION)
        .retriable_status_codes(RETRIABLE_STATUS_CODES)
}
