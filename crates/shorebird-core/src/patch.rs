//! Minimal JSON merge patches (RFC 7386): diff two snapshots, apply a patch.
//!
//! The diff is the heart of the commit protocol: only fields the mutation
//! actually changed travel to the store, so a stale local snapshot cannot
//! clobber fields some other writer owns. `apply_merge_patch` is the
//! store-side half, used by the in-memory store and the round-trip tests.

use serde_json::{Map, Value};

/// Computes the minimal merge patch turning `before` into `after`.
///
/// Unchanged fields are absent from the patch; fields removed in `after`
/// appear as explicit nulls; nested objects are diffed recursively.
pub fn diff_merge_patch(before: &Value, after: &Value) -> Value {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut patch = Map::new();
            for (k, av) in a {
                match b.get(k) {
                    Some(bv) if bv == av => {}
                    Some(bv) if bv.is_object() && av.is_object() => {
                        patch.insert(k.clone(), diff_merge_patch(bv, av));
                    }
                    _ => {
                        patch.insert(k.clone(), av.clone());
                    }
                }
            }
            for k in b.keys() {
                if !a.contains_key(k) {
                    patch.insert(k.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        // Anything that is not an object-to-object change is a whole-value
        // replacement under merge-patch semantics.
        _ => after.clone(),
    }
}

/// Applies a merge patch to `doc` in place, per RFC 7386.
pub fn apply_merge_patch(doc: &mut Value, patch: &Value) {
    let Value::Object(entries) = patch else {
        *doc = patch.clone();
        return;
    };
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    if let Value::Object(target) = doc {
        for (k, v) in entries {
            if v.is_null() {
                target.remove(k);
            } else if v.is_object() {
                let slot = target
                    .entry(k.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                apply_merge_patch(slot, v);
            } else {
                target.insert(k.clone(), v.clone());
            }
        }
    }
}
