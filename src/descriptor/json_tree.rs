//! JSON manifest backend.
//!
//! Field paths are single keys; root paths are walked one object key per
//! dotted segment. JSON has a single integer type, reported as
//! [`NativeType::Int`] when it fits 32 bits and [`NativeType::Int64`]
//! otherwise.

use anyhow::{Context, Result};
use serde_json::Value;

use super::{DescriptorTree, NativeType};

pub struct JsonTree {
    root: Value,
}

impl JsonTree {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text).context("invalid JSON manifest")?;
        Ok(Self::new(root))
    }
}

impl DescriptorTree for JsonTree {
    type Node = Value;

    fn root(&self) -> &Value {
        &self.root
    }

    fn get_child<'a>(&'a self, node: &'a Value, name: &str) -> Option<&'a Value> {
        node.as_object()?.get(name)
    }

    fn lookup<'a>(&'a self, node: &'a Value, path: &str) -> Option<&'a Value> {
        self.get_child(node, path)
    }

    fn lookup_dotted(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |node, name| node.as_object()?.get(name))
    }

    fn native_type(&self, node: &Value) -> NativeType {
        match node {
            Value::Null => NativeType::Null,
            Value::Bool(_) => NativeType::Bool,
            Value::Number(n) => match n.as_i64() {
                Some(v) if i32::try_from(v).is_ok() => NativeType::Int,
                Some(_) => NativeType::Int64,
                None if n.is_u64() => NativeType::Int64,
                None => NativeType::Float,
            },
            Value::String(_) => NativeType::String,
            Value::Array(_) => NativeType::Array,
            Value::Object(_) => NativeType::Group,
        }
    }

    fn as_str<'a>(&self, node: &'a Value) -> Option<&'a str> {
        node.as_str()
    }

    fn as_i64(&self, node: &Value) -> Option<i64> {
        node.as_i64()
    }

    fn as_f64(&self, node: &Value) -> Option<f64> {
        match node {
            Value::Number(n) if n.is_f64() => n.as_f64(),
            _ => None,
        }
    }

    fn as_bool(&self, node: &Value) -> Option<bool> {
        node.as_bool()
    }

    fn members<'a>(&'a self, node: &'a Value) -> Vec<(&'a str, &'a Value)> {
        match node {
            Value::Object(map) => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            _ => Vec::new(),
        }
    }

    fn elements<'a>(&'a self, node: &'a Value) -> Vec<&'a Value> {
        match node {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => Vec::new(),
        }
    }

    fn is_alias_container(&self, node: &Value) -> bool {
        matches!(node, Value::Object(_) | Value::Array(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DEFAULT_FIND_DEPTH;
    use serde_json::json;

    fn tree(value: Value) -> JsonTree {
        JsonTree::new(value)
    }

    #[test]
    fn get_field_reads_matching_types() {
        let t = tree(json!({ "size": 42, "big": 8_000_000_000i64, "flag": true, "ratio": 0.5 }));
        let root = t.root();

        let mut size = 0i32;
        t.get_field(root, Some("size"), &mut size);
        assert_eq!(size, 42);

        let mut big = 0i64;
        t.get_field(root, Some("big"), &mut big);
        assert_eq!(big, 8_000_000_000);

        let mut flag = false;
        t.get_field(root, Some("flag"), &mut flag);
        assert!(flag);

        let mut ratio = 0.0f64;
        t.get_field(root, Some("ratio"), &mut ratio);
        assert_eq!(ratio, 0.5);
    }

    #[test]
    fn get_field_widens_int_to_int64() {
        let t = tree(json!({ "size": 7 }));
        let mut wide = -1i64;
        t.get_field(t.root(), Some("size"), &mut wide);
        assert_eq!(wide, 7);
    }

    #[test]
    fn get_field_mismatch_leaves_dest_untouched() {
        let t = tree(json!({ "flag": 1, "name": "x", "size": 3 }));
        let root = t.root();

        let mut flag = true;
        t.get_field(root, Some("flag"), &mut flag);
        assert!(flag);

        let mut n = 99i32;
        t.get_field(root, Some("name"), &mut n);
        assert_eq!(n, 99);

        let mut d = 1.5f64;
        t.get_field(root, Some("size"), &mut d);
        assert_eq!(d, 1.5);

        let mut missing = 5i32;
        t.get_field(root, Some("nope"), &mut missing);
        assert_eq!(missing, 5);
    }

    #[test]
    fn get_field_string_requires_string() {
        let t = tree(json!({ "a": "text", "b": 3 }));
        let root = t.root();
        assert_eq!(t.get_field_string(root, Some("a")), Some("text"));
        assert_eq!(t.get_field_string(root, Some("b")), None);
        assert_eq!(t.get_field_string(root, Some("c")), None);
        let a = t.get_child(root, "a").unwrap();
        assert_eq!(t.get_field_string(a, None), Some("text"));
    }

    #[test]
    fn numeric_value_checks() {
        let t = tree(json!({ "i": 1, "f": 1.0, "s": "1", "b": false }));
        let root = t.root();
        assert!(t.is_field_numeric(root, Some("i")));
        assert!(t.is_field_numeric(root, Some("f")));
        assert!(!t.is_field_numeric(root, Some("s")));
        assert!(!t.is_field_numeric(root, Some("b")));
        assert!(!t.is_field_numeric(root, Some("missing")));
    }

    #[test]
    fn iterate_field_visits_strings_and_string_elements() {
        let t = tree(json!({
            "key": "value",
            "list": ["a", 1, "b"],
            "num": 5
        }));
        let mut seen = Vec::new();
        t.iterate_field(t.root(), |k, v| seen.push(format!("{k}={v}")));
        assert_eq!(seen, vec!["key=value", "list=a", "list=b"]);
    }

    #[test]
    fn get_node_walks_dotted_path() {
        let t = tree(json!({ "software": { "board": { "version": "1" } } }));
        let node = t.get_node(&["software", "board"]).unwrap();
        assert_eq!(t.get_field_string(node, Some("version")), Some("1"));
        assert!(t.get_node(&["software", "missing"]).is_none());
    }

    #[test]
    fn find_root_without_ref_returns_node() {
        let t = tree(json!({ "software": { "images": [] } }));
        let direct = t.get_node(&["software"]).unwrap();
        let found = t.find_root(&["software"], DEFAULT_FIND_DEPTH).unwrap();
        assert!(std::ptr::eq(direct, found));
    }

    #[test]
    fn find_root_follows_alias() {
        let t = tree(json!({
            "software": {
                "stable": { "ref": "#./common" },
                "common": { "images": [ { "filename": "rootfs" } ] }
            }
        }));
        let node = t.find_root(&["software", "stable"], 4).unwrap();
        assert!(t.get_child(node, "images").is_some());
    }

    #[test]
    fn find_root_alias_cycle_terminates() {
        let t = tree(json!({
            "A": { "ref": "B" },
            "B": { "ref": "C" },
            "C": { "ref": "C" }
        }));
        assert!(t.find_root(&["A"], 3).is_none());
        assert!(t.find_root(&["A"], 0).is_none());
    }

    #[test]
    fn find_root_dangling_alias_is_absent() {
        let t = tree(json!({ "A": { "ref": "#./nowhere" } }));
        assert!(t.find_root(&["A"], 5).is_none());
    }
}
