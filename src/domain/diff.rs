//! One-directional structural diff of field mappings.

use serde_json::{Map, Value};

/// Keys of `before` whose values differ in `after`, mapped to `after`'s value.
///
/// Nested objects on both sides are compared recursively and only reported
/// when something inside them changed. A key missing from `after` is reported
/// as `null`. Keys that only exist in `after` are never reported.
pub fn diff(before: &Map<String, Value>, after: &Map<String, Value>) -> Map<String, Value> {
    let mut changes = Map::new();
    for (key, old) in before {
        let new = after.get(key);
        match (old, new) {
            (Value::Object(old_map), Some(Value::Object(new_map))) => {
                let nested = diff(old_map, new_map);
                if !nested.is_empty() {
                    changes.insert(key.clone(), Value::Object(nested));
                }
            }
            (_, Some(new)) if new == old => {}
            (_, new) => {
                changes.insert(key.clone(), new.cloned().unwrap_or(Value::Null));
            }
        }
    }
    changes
}
