//! Group/setting manifest backend over `toml::Value`.
//!
//! Tables are groups, arrays are lists. Field paths may be dotted and may
//! index into lists with a numeric segment (`images.0.filename`), matching
//! setting-path lookup in group-structured configuration files. Only
//! groups can carry a `ref` alias.

use anyhow::{Context, Result};
use toml::{Table, Value};

use super::{DescriptorTree, NativeType};

pub struct TomlTree {
    root: Value,
}

impl TomlTree {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let table: Table = toml::from_str(text).context("invalid TOML manifest")?;
        Ok(Self::new(Value::Table(table)))
    }
}

fn step<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Table(table) => table.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

impl DescriptorTree for TomlTree {
    type Node = Value;

    fn root(&self) -> &Value {
        &self.root
    }

    fn get_child<'a>(&'a self, node: &'a Value, name: &str) -> Option<&'a Value> {
        node.as_table()?.get(name)
    }

    fn lookup<'a>(&'a self, node: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.').try_fold(node, step)
    }

    fn lookup_dotted(&self, path: &str) -> Option<&Value> {
        self.lookup(&self.root, path)
    }

    fn native_type(&self, node: &Value) -> NativeType {
        match node {
            Value::String(_) => NativeType::String,
            Value::Integer(v) if i32::try_from(*v).is_ok() => NativeType::Int,
            Value::Integer(_) => NativeType::Int64,
            Value::Float(_) => NativeType::Float,
            Value::Boolean(_) => NativeType::Bool,
            Value::Array(_) => NativeType::Array,
            Value::Table(_) => NativeType::Group,
            Value::Datetime(_) => NativeType::Null,
        }
    }

    fn as_str<'a>(&self, node: &'a Value) -> Option<&'a str> {
        node.as_str()
    }

    fn as_i64(&self, node: &Value) -> Option<i64> {
        node.as_integer()
    }

    fn as_f64(&self, node: &Value) -> Option<f64> {
        node.as_float()
    }

    fn as_bool(&self, node: &Value) -> Option<bool> {
        node.as_bool()
    }

    fn members<'a>(&'a self, node: &'a Value) -> Vec<(&'a str, &'a Value)> {
        match node {
            Value::Table(table) => table.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            _ => Vec::new(),
        }
    }

    fn elements<'a>(&'a self, node: &'a Value) -> Vec<&'a Value> {
        match node {
            Value::Array(items) => items.iter().collect(),
            Value::Table(table) => table.values().collect(),
            _ => Vec::new(),
        }
    }

    fn is_alias_container(&self, node: &Value) -> bool {
        node.is_table()
    }
}
