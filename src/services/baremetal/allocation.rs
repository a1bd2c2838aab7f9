use super::schema_for;
use crate::error::{Error, Result};
use crate::resource::{resource_type, Coercion, Field, QueryMapping, Schema, Timestamp, UpdateMethod};
use crate::session::Session;
use crate::wait::WaitPolicy;
use std::sync::OnceLock;

fn allocation_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        schema_for("baremetal.allocation", "/allocations", "allocations")
            .update_method(UpdateMethod::PatchJson)
            .query(
                QueryMapping::new(&["node", "resource_class", "state", "owner", "fields"]),
            )
            .fields(vec![
                Field::body("id", "uuid").alternate_id(),
                Field::body("candidate_nodes", "candidate_nodes").coerce(Coercion::List),
                Field::body("created_at", "created_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("extra", "extra").coerce(Coercion::Dict),
                Field::body("last_error", "last_error"),
                Field::body("node_id", "node_uuid"),
                Field::body("owner", "owner"),
                Field::body("resource_class", "resource_class"),
                Field::body("state", "state"),
                Field::body("traits", "traits").coerce(Coercion::List),
                Field::body("updated_at", "updated_at").coerce(Coercion::Format(&Timestamp)),
            ])
    })
}

resource_type!(
    /// A request to pick and reserve a node matching a resource class
    Allocation => allocation_schema
);

impl Allocation {
    pub fn state(&self) -> Option<String> {
        self.get_str("state")
    }

    /// Poll until the allocation leaves the `allocating` state.
    ///
    /// An `error` state raises `ResourceFailure` unless `ignore_error`.
    pub async fn wait(&mut self, session: &dyn Session, policy: WaitPolicy, ignore_error: bool) -> Result<()> {
        let id = self.id().unwrap_or_default();
        let mut ticker = policy.ticker(format!("Timeout waiting for the allocation {}", id));

        loop {
            ticker.next().await?;
            self.fetch(session).await?;

            match self.state().as_deref() {
                Some("error") if !ignore_error => {
                    return Err(Error::ResourceFailure(format!(
                        "Allocation {} failed: {}",
                        id,
                        self.get_str("last_error").unwrap_or_default()
                    )))
                },
                Some("allocating") => {
                    tracing::debug!("Still waiting for the allocation {}", id);
                },
                _ => return Ok(()),
            }
        }
    }
}
