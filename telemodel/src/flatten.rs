//! Flattening of nested key/value structures.
//!
//! Records serialize to JSON objects that may nest. Metric points are flat,
//! so nested objects are collapsed by joining the key path with a separator:
//! `{"net": {"rx": 1}}` becomes `{"net_rx": 1}`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Separator used by [`flatten_default`].
pub const DEFAULT_SEPARATOR: &str = "_";

/// Collapses a nested object into a single-level map.
///
/// Every nested object is recursed into with the key path
/// `prefix + sep + key` (or just `key` when `prefix` is empty). Non-object
/// values, arrays included, are emitted as leaves. An empty nested object
/// contributes nothing.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use telemodel::flatten::flatten;
///
/// let nested = json!({"a": 1, "b": {"c": 2, "d": {"e": 3}}});
/// let flat = flatten(nested.as_object().unwrap(), "", "_");
///
/// assert_eq!(flat["a"], json!(1));
/// assert_eq!(flat["b_c"], json!(2));
/// assert_eq!(flat["b_d_e"], json!(3));
/// ```
pub fn flatten(map: &Map<String, Value>, prefix: &str, sep: &str) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(map, prefix, sep, &mut out);
    out
}

/// [`flatten`] with no prefix and `_` as separator.
pub fn flatten_default(map: &Map<String, Value>) -> BTreeMap<String, Value> {
    flatten(map, "", DEFAULT_SEPARATOR)
}

fn flatten_into(
    map: &Map<String, Value>,
    prefix: &str,
    sep: &str,
    out: &mut BTreeMap<String, Value>,
) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{sep}{key}")
        };

        match value {
            Value::Object(nested) => flatten_into(nested, &path, sep, out),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_flat_input_unchanged() {
        let input = obj(json!({"category": "x", "value": 1.5, "ok": true}));
        let flat = flatten_default(&input);

        assert_eq!(flat.len(), 3);
        assert_eq!(flat["category"], json!("x"));
        assert_eq!(flat["value"], json!(1.5));
        assert_eq!(flat["ok"], json!(true));
    }

    #[test]
    fn test_deep_nesting() {
        let input = obj(json!({"a": {"b": {"c": {"d": {"e": 5}}}}}));
        let flat = flatten_default(&input);

        assert_eq!(flat.len(), 1);
        assert_eq!(flat["a_b_c_d_e"], json!(5));
    }

    #[test]
    fn test_prefix_and_separator() {
        let input = obj(json!({"rx": 1, "tx": {"bytes": 2}}));
        let flat = flatten(&input, "net", ".");

        assert_eq!(flat["net.rx"], json!(1));
        assert_eq!(flat["net.tx.bytes"], json!(2));
    }

    #[test]
    fn test_arrays_and_nulls_are_leaves() {
        let input = obj(json!({"list": [1, 2], "nothing": null, "empty": {}}));
        let flat = flatten_default(&input);

        assert_eq!(flat.len(), 2);
        assert_eq!(flat["list"], json!([1, 2]));
        assert_eq!(flat["nothing"], Value::Null);
        assert!(!flat.contains_key("empty"));
    }
}
