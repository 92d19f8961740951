//! Stable fingerprints and ids so identical inputs plan identical change sets.

use reqfix_types::changeset::ChangeOp;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const CHANGE_SET_NAMESPACE: Uuid = Uuid::from_bytes([
    0x3c, 0x0e, 0x7a, 0x51, 0x94, 0x2d, 0x4f, 0x6b, 0xa1, 0x08, 0xd7, 0x5e, 0x22, 0x9f, 0x41, 0xc3,
]);

/// Recursively sort object keys so equal values serialize identically.
pub fn canonicalize_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                if let Some(v) = map.get(&k) {
                    out.insert(k, canonicalize_json(v));
                }
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize_json).collect())
        }
        other => other.clone(),
    }
}

/// Hex sha256 of the canonical JSON form.
pub fn fingerprint(value: &serde_json::Value) -> String {
    let canonical = canonicalize_json(value);
    let s = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn op_fingerprint(op: &ChangeOp) -> String {
    match serde_json::to_value(op) {
        Ok(value) => fingerprint(&value),
        Err(_) => op.sort_key(),
    }
}

/// v5(namespace, iteration | scope | op keys...).
///
/// `scope` names what the set answers (rule ids plus violation ids), so two sets carrying the
/// same operations for different violations still get distinct ids.
pub fn change_set_id<'a>(
    iteration: u32,
    scope: &str,
    ops: impl IntoIterator<Item = &'a ChangeOp>,
) -> Uuid {
    let mut key = format!("{}|{}", iteration, scope);
    for op in ops {
        key.push('|');
        key.push_str(&op.sort_key());
        key.push('#');
        key.push_str(&op_fingerprint(op));
    }
    Uuid::new_v5(&CHANGE_SET_NAMESPACE, key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqfix_types::changeset::TextField;

    fn rewrite(new: &str) -> ChangeOp {
        ChangeOp::Rewrite {
            target: "F-1".into(),
            field: TextField::Description,
            old: "old".into(),
            new: new.into(),
        }
    }

    #[test]
    fn fingerprint_is_key_order_independent() {
        let a = serde_json::json!({"b": 1, "a": {"z": 2, "y": 3}});
        let b = serde_json::json!({"a": {"y": 3, "z": 2}, "b": 1});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn change_set_id_is_stable_and_content_sensitive() {
        let one = rewrite("new");
        let two = rewrite("newer");
        assert_eq!(
            change_set_id(1, "E1", [&one]),
            change_set_id(1, "E1", [&one])
        );
        assert_ne!(
            change_set_id(1, "E1", [&one]),
            change_set_id(1, "E1", [&two])
        );
        assert_ne!(
            change_set_id(1, "E1", [&one]),
            change_set_id(2, "E1", [&one])
        );
    }
}
