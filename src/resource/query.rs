//! Query parameter mapping for list calls

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameters every list call accepts
const PAGINATION_PARAMS: &[&str] = &["limit", "marker"];

/// Client-side query names -> server-side query names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMapping {
    mapping: BTreeMap<String, String>,
}

impl QueryMapping {
    /// Accept `names` as-is, plus `limit` and `marker`
    pub fn new(names: &[&str]) -> Self {
        let mapping = PAGINATION_PARAMS
            .iter()
            .chain(names.iter())
            .map(|n| (n.to_string(), n.to_string()))
            .collect();
        Self { mapping }
    }

    /// Accept `client` and send it as `server`
    pub fn rename(mut self, client: &str, server: &str) -> Self {
        self.mapping.insert(client.to_string(), server.to_string());
        self
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.mapping.contains_key(name)
    }

    /// Translate client parameters into server query pairs.
    /// Null values are dropped; lists are sent comma separated.
    pub fn transpose(&self, params: &BTreeMap<String, Value>) -> Result<Vec<(String, String)>> {
        let mut query = Vec::with_capacity(params.len());
        for (name, value) in params {
            let Some(server) = self.mapping.get(name) else {
                return Err(Error::InvalidRequest(format!(
                    "invalid query parameter '{}'",
                    name
                )));
            };
            if let Some(rendered) = render_query_value(value) {
                query.push((server.clone(), rendered));
            }
        }
        Ok(query)
    }
}

fn render_query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(render_query_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}
