//! Recipe layer merging
//!
//! - Tables: merged key by key, recursively
//! - Lists: replaced wholesale by the later layer
//! - Scalars: later layer wins

use serde_json::Value;

/// Overlay `layer` onto `base`.
pub fn deep_merge(base: Value, layer: Value) -> Value {
    match (base, layer) {
        (Value::Object(mut table), Value::Object(overrides)) => {
            for (key, value) in overrides {
                let merged = match table.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                table.insert(key, merged);
            }
            Value::Object(table)
        }
        (_, layer) => layer,
    }
}

/// Merge layers in precedence order, lowest first
pub fn merge_layers(layers: impl IntoIterator<Item = Value>) -> Value {
    layers
        .into_iter()
        .fold(Value::Object(Default::default()), deep_merge)
}
