//! Bare metal node: provisioning, power and maintenance
//!
//! A node moves through provision states (`enroll`, `manageable`,
//! `available`, `active`, ...) in response to actions sent to
//! `/nodes/{id}/states/provision`. Transitions are asynchronous, so every
//! action can optionally be followed by a wait on the resulting state.

use super::schema_for;
use crate::error::{Error, Result};
use crate::resource::{resource_type, Coercion, Field, FieldDefault, QueryMapping, Schema, Timestamp, UpdateMethod};
use crate::session::Session;
use crate::wait::WaitPolicy;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

fn node_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        schema_for("baremetal.node", "/nodes", "nodes")
            .update_method(UpdateMethod::PatchJson)
            .query(
                QueryMapping::new(&[
                    "associated",
                    "conductor_group",
                    "driver",
                    "fault",
                    "provision_state",
                    "resource_class",
                    "fields",
                    "owner",
                ])
                .rename("instance_id", "instance_uuid")
                .rename("is_maintenance", "maintenance"),
            )
            .fields(vec![
                Field::body("id", "uuid").alternate_id(),
                Field::body("allocation_id", "allocation_uuid"),
                Field::body("boot_interface", "boot_interface"),
                Field::body("chassis_id", "chassis_uuid"),
                Field::body("clean_step", "clean_step").coerce(Coercion::Dict),
                Field::body("conductor", "conductor"),
                Field::body("conductor_group", "conductor_group"),
                Field::body("created_at", "created_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("deploy_interface", "deploy_interface"),
                Field::body("driver", "driver"),
                Field::body("driver_info", "driver_info").coerce(Coercion::Dict),
                Field::body("driver_internal_info", "driver_internal_info").coerce(Coercion::Dict),
                Field::body("extra", "extra").coerce(Coercion::Dict),
                Field::body("fault", "fault"),
                Field::body("instance_id", "instance_uuid"),
                Field::body("instance_info", "instance_info").coerce(Coercion::Dict),
                Field::body("is_automated_clean_enabled", "automated_clean").coerce(Coercion::Boolean),
                Field::body("is_console_enabled", "console_enabled").coerce(Coercion::Boolean),
                Field::body("is_maintenance", "maintenance")
                    .coerce(Coercion::Boolean)
                    .default(FieldDefault::Bool(false)),
                Field::body("is_protected", "protected").coerce(Coercion::Boolean),
                Field::body("last_error", "last_error"),
                Field::body("maintenance_reason", "maintenance_reason"),
                Field::body("network_interface", "network_interface"),
                Field::body("owner", "owner"),
                Field::body("power_interface", "power_interface"),
                Field::body("power_state", "power_state"),
                Field::body("properties", "properties").coerce(Coercion::Dict),
                Field::body("provision_state", "provision_state"),
                Field::body("reservation", "reservation"),
                Field::body("resource_class", "resource_class"),
                Field::body("target_power_state", "target_power_state"),
                Field::body("target_provision_state", "target_provision_state"),
                Field::body("traits", "traits").coerce(Coercion::List),
                Field::body("updated_at", "updated_at").coerce(Coercion::Format(&Timestamp)),
            ])
    })
}

resource_type!(
    /// A bare metal server managed by the provisioning service
    Node => node_schema
);

/// Provision state a node settles in after each provision target
pub fn expected_provision_state(target: &str) -> &str {
    match target {
        "active" | "rebuild" | "unrescue" => "active",
        "adopt" | "provide" | "deleted" | "undeploy" => "available",
        "clean" | "inspect" | "manage" => "manageable",
        "rescue" => "rescue",
        other => other,
    }
}

/// Power state a node settles in after each power target
pub fn expected_power_state(target: &str) -> &str {
    match target {
        "power on" | "rebooting" | "soft rebooting" => "power on",
        "power off" | "soft power off" => "power off",
        other => other,
    }
}

/// Body of a provision state change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionRequest {
    pub target: String,
    pub config_drive: Option<Value>,
    pub clean_steps: Option<Value>,
    pub rescue_password: Option<String>,
}

impl ProvisionRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn config_drive(mut self, config_drive: Value) -> Self {
        self.config_drive = Some(config_drive);
        self
    }

    pub fn clean_steps(mut self, steps: Value) -> Self {
        self.clean_steps = Some(steps);
        self
    }

    pub fn rescue_password(mut self, password: impl Into<String>) -> Self {
        self.rescue_password = Some(password.into());
        self
    }

    /// Validate argument combinations and build the request body
    pub fn to_body(&self) -> Result<Value> {
        let target = self.target.as_str();
        let mut body = Map::new();
        body.insert("target".to_string(), json!(target));

        if let Some(ref config_drive) = self.config_drive {
            if target != "active" && target != "rebuild" {
                return Err(Error::InvalidRequest(format!(
                    "Config drive can only be provided with \"active\" and \"rebuild\" targets, got {}",
                    target
                )));
            }
            body.insert("configdrive".to_string(), config_drive.clone());
        }

        match (&self.clean_steps, target) {
            (Some(steps), "clean") => {
                body.insert("clean_steps".to_string(), steps.clone());
            },
            (Some(_), _) => {
                return Err(Error::InvalidRequest(
                    "Clean steps can only be provided with \"clean\" target".to_string(),
                ))
            },
            (None, "clean") => {
                return Err(Error::InvalidRequest(
                    "Clean steps are required for \"clean\" target".to_string(),
                ))
            },
            (None, _) => {},
        }

        match (&self.rescue_password, target) {
            (Some(password), "rescue") => {
                body.insert("rescue_password".to_string(), json!(password));
            },
            (Some(_), _) => {
                return Err(Error::InvalidRequest(
                    "Rescue password can only be provided with \"rescue\" target".to_string(),
                ))
            },
            (None, "rescue") => {
                return Err(Error::InvalidRequest(
                    "Rescue password is required for \"rescue\" target".to_string(),
                ))
            },
            (None, _) => {},
        }

        Ok(Value::Object(body))
    }
}

impl Node {
    pub fn provision_state(&self) -> Option<String> {
        self.get_str("provision_state")
    }

    pub fn power_state(&self) -> Option<String> {
        self.get_str("power_state")
    }

    pub fn reservation(&self) -> Option<String> {
        self.get_str("reservation")
    }

    pub fn last_error(&self) -> Option<String> {
        self.get_str("last_error")
    }

    pub fn is_maintenance(&self) -> bool {
        self.get_bool("is_maintenance").unwrap_or(false)
    }

    /// Request a provision state change, optionally waiting for the
    /// resulting state. Without waiting the node is re-fetched once.
    pub async fn set_provision_state(
        &mut self,
        session: &dyn Session,
        request: ProvisionRequest,
        wait: Option<WaitPolicy>,
    ) -> Result<()> {
        let body = request.to_body()?;
        self.action(session, Method::PUT, "states/provision", Some(body)).await?;

        match wait {
            Some(policy) => {
                let expected = expected_provision_state(&request.target).to_string();
                self.wait_for_provision_state(session, &expected, policy, true).await
            },
            None => self.fetch(session).await,
        }
    }

    /// Request a power state change, optionally waiting for it to settle
    pub async fn set_power_state(
        &mut self,
        session: &dyn Session,
        target: &str,
        wait: Option<WaitPolicy>,
    ) -> Result<()> {
        self.action(session, Method::PUT, "states/power", Some(json!({ "target": target })))
            .await?;

        match wait {
            Some(policy) => {
                self.wait_for_power_state(session, expected_power_state(target), policy)
                    .await
            },
            None => Ok(()),
        }
    }

    /// Put the node into maintenance mode
    pub async fn set_maintenance(&mut self, session: &dyn Session, reason: Option<&str>) -> Result<()> {
        self.action(session, Method::PUT, "maintenance", Some(json!({ "reason": reason })))
            .await?;
        self.fetch(session).await
    }

    /// Take the node out of maintenance mode
    pub async fn unset_maintenance(&mut self, session: &dyn Session) -> Result<()> {
        self.action(session, Method::DELETE, "maintenance", None).await?;
        self.fetch(session).await
    }

    /// Whether the node reached `expected`.
    ///
    /// With `abort_on_failed_state`, a failure state is an error; otherwise
    /// it is treated as "not yet".
    pub fn check_state_reached(&self, expected: &str, abort_on_failed_state: bool) -> Result<bool> {
        let state = self.provision_state();
        match state.as_deref() {
            Some(s) if s == expected => return Ok(true),
            None if expected == "available" => return Ok(true),
            _ => {},
        }

        if !abort_on_failed_state {
            return Ok(false);
        }

        let id = self.id().unwrap_or_default();
        match state.as_deref() {
            Some(s) if s.ends_with(" failed") || s == "error" => Err(Error::ResourceFailure(format!(
                "Node {} reached failure state \"{}\"; the last error is {}",
                id,
                s,
                self.last_error().unwrap_or_default()
            ))),
            // Failed manage requests drop back to enroll with last_error set
            Some("enroll") if expected == "manageable" && self.last_error().is_some_and(|e| !e.is_empty()) => {
                Err(Error::ResourceFailure(format!(
                    "Node {} could not reach state manageable: failed to verify management credentials; the last error is {}",
                    id,
                    self.last_error().unwrap_or_default()
                )))
            },
            _ => Ok(false),
        }
    }

    /// Poll until the node reaches provision state `expected`
    pub async fn wait_for_provision_state(
        &mut self,
        session: &dyn Session,
        expected: &str,
        policy: WaitPolicy,
        abort_on_failed_state: bool,
    ) -> Result<()> {
        let id = self.id().unwrap_or_default();
        let mut ticker = policy.ticker(format!(
            "Timeout waiting for node {} to reach target state '{}'",
            id, expected
        ));

        loop {
            ticker.next().await?;
            self.fetch(session).await?;
            if self.check_state_reached(expected, abort_on_failed_state)? {
                return Ok(());
            }

            tracing::debug!(
                "Still waiting for node {} to reach state {}, the current state is {:?}",
                id,
                expected,
                self.provision_state()
            );
        }
    }

    /// Poll until the node reaches power state `expected`
    pub async fn wait_for_power_state(
        &mut self,
        session: &dyn Session,
        expected: &str,
        policy: WaitPolicy,
    ) -> Result<()> {
        let id = self.id().unwrap_or_default();
        let mut ticker = policy.ticker(format!(
            "Timeout waiting for node {} to reach power state '{}'",
            id, expected
        ));

        loop {
            ticker.next().await?;
            self.fetch(session).await?;
            if self.power_state().as_deref() == Some(expected) {
                return Ok(());
            }

            tracing::debug!(
                "Still waiting for node {} to reach power state {}, the current state is {:?}",
                id,
                expected,
                self.power_state()
            );
        }
    }

    /// Poll until the node lock is released. An unreserved node returns
    /// without any request.
    pub async fn wait_for_reservation(&mut self, session: &dyn Session, policy: WaitPolicy) -> Result<()> {
        if self.reservation().is_none() {
            return Ok(());
        }

        let id = self.id().unwrap_or_default();
        let mut ticker = policy.ticker(format!("Timeout waiting for the lock to be released on node {}", id));

        loop {
            ticker.next().await?;
            self.fetch(session).await?;
            match self.reservation() {
                None => return Ok(()),
                Some(holder) => tracing::debug!("Node {} is still reserved by {}", id, holder),
            }
        }
    }
}
