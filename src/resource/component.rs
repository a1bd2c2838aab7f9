//! Component Manager
//!
//! Storage for one attribute group (body, header or uri) of a resource:
//! the current values keyed by wire name, plus the set of keys changed
//! since the last successful exchange with the server.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentManager {
    values: Map<String, Value>,
    dirty: BTreeSet<String>,
}

impl ComponentManager {
    /// Values from the server are `synchronized` and start clean;
    /// anything else starts with every key dirty.
    pub fn new(values: Map<String, Value>, synchronized: bool) -> Self {
        let dirty = if synchronized {
            BTreeSet::new()
        } else {
            values.keys().cloned().collect()
        };
        Self { values, dirty }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Store a value; the key becomes dirty only if the value changed
    pub fn set(&mut self, key: &str, value: Value) {
        if self.values.get(key) == Some(&value) {
            return;
        }
        self.values.insert(key.to_string(), value);
        self.dirty.insert(key.to_string());
    }

    /// Remove a value; the removal itself is a pending change
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty.insert(key.to_string());
        }
        removed
    }

    /// Dirty keys with their current value, `null` for removed keys
    pub fn dirty(&self) -> Map<String, Value> {
        self.dirty
            .iter()
            .map(|key| {
                let value = self.values.get(key).cloned().unwrap_or(Value::Null);
                (key.clone(), value)
            })
            .collect()
    }

    /// Dirty keys that were removed rather than set
    pub fn removed_keys(&self) -> Vec<String> {
        self.dirty
            .iter()
            .filter(|key| !self.values.contains_key(*key))
            .cloned()
            .collect()
    }

    pub fn dirty_keys(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Mark everything as synchronized without touching the values
    pub fn clean(&mut self) {
        self.dirty.clear();
    }

    /// Merge server-confirmed values over the current ones
    pub fn update_synchronized(&mut self, values: Map<String, Value>) {
        self.values.extend(values);
        self.dirty.clear();
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_unsynchronized_marks_all_keys_dirty() {
        let cm = ComponentManager::new(map(json!({"a": 1, "b": "x"})), false);
        let keys: Vec<_> = cm.dirty_keys().iter().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_synchronized_starts_clean() {
        let cm = ComponentManager::new(map(json!({"a": 1})), true);
        assert!(!cm.is_dirty());
        assert_eq!(cm.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_set_same_value_is_not_dirty() {
        let mut cm = ComponentManager::new(map(json!({"a": 1})), true);
        cm.set("a", json!(1));
        assert!(!cm.is_dirty());
        cm.set("a", json!(2));
        assert_eq!(cm.dirty(), map(json!({"a": 2})));
    }

    #[test]
    fn test_remove_is_reported_as_null() {
        let mut cm = ComponentManager::new(map(json!({"a": 1, "b": 2})), true);
        assert_eq!(cm.remove("a"), Some(json!(1)));
        assert_eq!(cm.dirty(), map(json!({"a": null})));
        assert_eq!(cm.removed_keys(), vec!["a".to_string()]);

        // Removing an absent key changes nothing
        cm.clean();
        assert_eq!(cm.remove("missing"), None);
        assert!(!cm.is_dirty());
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut cm = ComponentManager::new(map(json!({"a": 1})), false);
        cm.clean();
        let once = cm.clone();
        cm.clean();
        assert_eq!(cm, once);
        assert_eq!(cm.get("a"), Some(&json!(1)));
    }
}
