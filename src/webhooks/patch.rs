//! JSON Patch generation.
//!
//! [`diff`] compares an admitted pod with its mutated copy and returns the
//! operations that turn one into the other. Output order is deterministic:
//! volumes first, then container mounts, then annotations, then anything else.
//! Within a section, object keys are visited in sorted order and array items
//! by index.
//!
//! Arrays are compared position by position. Items appended to an existing list
//! become one `add` per item at its explicit index. A list (or map) that did not
//! exist at all is added whole, since the pointer to its first item would not
//! resolve.

use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::Pod;
use serde_json::Value;

use crate::error::Result;

/// Sections diffed ahead of the rest of the document, in emission order
const ORDERED_SECTIONS: [(&str, &str); 3] = [
    ("spec", "volumes"),
    ("spec", "containers"),
    ("metadata", "annotations"),
];

/// Compute the patch that turns `original` into `mutated`
pub fn diff(original: &Pod, mutated: &Pod) -> Result<Vec<PatchOperation>> {
    let original = serde_json::to_value(original)?;
    let mutated = serde_json::to_value(mutated)?;
    Ok(diff_values(&original, &mutated))
}

/// Compute the patch between two arbitrary JSON documents
pub fn diff_values(original: &Value, mutated: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    let mut original = original.clone();
    let mut mutated = mutated.clone();

    for (parent, key) in ORDERED_SECTIONS {
        let (Some(Value::Object(before)), Some(Value::Object(after))) =
            (original.get_mut(parent), mutated.get_mut(parent))
        else {
            continue;
        };
        let before = before.remove(key);
        let after = after.remove(key);
        let path = PointerBuf::from_tokens([parent, key]);
        diff_entry(path, before.as_ref(), after.as_ref(), &mut ops);
    }

    diff_at(PointerBuf::root(), &original, &mutated, &mut ops);
    ops
}

fn diff_entry(
    path: PointerBuf,
    before: Option<&Value>,
    after: Option<&Value>,
    ops: &mut Vec<PatchOperation>,
) {
    match (before, after) {
        (None, None) => {}
        (None, Some(value)) => ops.push(PatchOperation::Add(AddOperation {
            path,
            value: value.clone(),
        })),
        (Some(_), None) => ops.push(PatchOperation::Remove(RemoveOperation { path })),
        (Some(before), Some(after)) => diff_at(path, before, after, ops),
    }
}

fn diff_at(path: PointerBuf, before: &Value, after: &Value, ops: &mut Vec<PatchOperation>) {
    if before == after {
        return;
    }

    match (before, after) {
        (Value::Object(before), Value::Object(after)) => {
            let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                diff_entry(child(&path, key), before.get(key), after.get(key), ops);
            }
        }
        (Value::Array(before), Value::Array(after)) => {
            for (index, (b, a)) in before.iter().zip(after.iter()).enumerate() {
                diff_at(child(&path, &index.to_string()), b, a, ops);
            }
            for (index, value) in after.iter().enumerate().skip(before.len()) {
                ops.push(PatchOperation::Add(AddOperation {
                    path: child(&path, &index.to_string()),
                    value: value.clone(),
                }));
            }
            // Highest index first so earlier removals don't shift later ones
            for index in (after.len()..before.len()).rev() {
                ops.push(PatchOperation::Remove(RemoveOperation {
                    path: child(&path, &index.to_string()),
                }));
            }
        }
        _ => ops.push(PatchOperation::Replace(ReplaceOperation {
            path,
            value: after.clone(),
        })),
    }
}

fn child(path: &PointerBuf, token: &str) -> PointerBuf {
    let mut path = path.clone();
    path.push_back(token);
    path
}
