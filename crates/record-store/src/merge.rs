//! JSON merge patch (RFC 7386) helpers
//!
//! `merge_diff` computes the patch that turns one document into another,
//! `apply_merge_patch` applies such a patch in place. Arrays are treated as
//! opaque values and replaced as a whole, as the RFC requires.

use serde_json::{Map, Value};

/// Merge patch turning `from` into `to`, or `None` when they are equal
pub fn merge_diff(from: &Value, to: &Value) -> Option<Value> {
    match (from, to) {
        (Value::Object(from), Value::Object(to)) => {
            let mut patch = Map::new();
            for (key, to_value) in to {
                match from.get(key) {
                    Some(from_value) => {
                        if let Some(inner) = merge_diff(from_value, to_value) {
                            patch.insert(key.clone(), inner);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), to_value.clone());
                    }
                }
            }
            for key in from.keys() {
                if !to.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        (from, to) if from == to => None,
        // A null target can only be expressed by deleting the key in the parent
        (_, to) => Some(to.clone()),
    }
}

/// Applies `patch` to `target` following RFC 7386
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(map) = target {
        for (key, value) in patch {
            if value.is_null() {
                map.remove(key);
            } else {
                apply_merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
