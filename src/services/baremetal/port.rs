use super::schema_for;
use crate::resource::{resource_type, Coercion, Field, QueryMapping, Schema, Timestamp, UpdateMethod};
use std::sync::OnceLock;

fn port_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        schema_for("baremetal.port", "/ports", "ports")
            .update_method(UpdateMethod::PatchJson)
            .query(
                QueryMapping::new(&["address", "node", "portgroup", "fields"])
                    .rename("node_id", "node_uuid")
                    .rename("port_group_id", "portgroup_uuid"),
            )
            .fields(vec![
                Field::body("id", "uuid").alternate_id(),
                Field::body("address", "address"),
                Field::body("created_at", "created_at").coerce(Coercion::Format(&Timestamp)),
                Field::body("extra", "extra").coerce(Coercion::Dict),
                Field::body("internal_info", "internal_info").coerce(Coercion::Dict),
                Field::body("is_pxe_enabled", "pxe_enabled").coerce(Coercion::Boolean),
                Field::body("local_link_connection", "local_link_connection").coerce(Coercion::Dict),
                Field::body("node_id", "node_uuid"),
                Field::body("physical_network", "physical_network"),
                Field::body("port_group_id", "portgroup_uuid"),
                Field::body("updated_at", "updated_at").coerce(Coercion::Format(&Timestamp)),
            ])
    })
}

resource_type!(
    /// A physical network interface of a node, referencing it by `node_id`
    Port => port_schema
);

impl Port {
    pub fn address(&self) -> Option<String> {
        self.get_str("address")
    }

    pub fn node_id(&self) -> Option<String> {
        self.get_str("node_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use serde_json::json;

    #[test]
    fn test_wire_names() {
        let port = Port::new(
            json!({"address": "52:54:00:aa:bb:cc", "node_id": "n1"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let request = port.prepare_request(false, true).unwrap();
        assert_eq!(request.uri, "/ports");
        assert_eq!(
            request.body,
            Some(json!({"address": "52:54:00:aa:bb:cc", "node_uuid": "n1"}))
        );
        assert_eq!(port.node_id().as_deref(), Some("n1"));
    }

    #[test]
    fn test_query_renames_node_filter() {
        let mut params = std::collections::BTreeMap::new();
        params.insert("node_id".to_string(), json!("n1"));
        let query = Port::schema().query.transpose(&params).unwrap();
        assert_eq!(query, vec![("node_uuid".to_string(), "n1".to_string())]);
    }
}
