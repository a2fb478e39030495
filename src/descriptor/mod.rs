//! Backend-agnostic reader over a parsed update manifest.
//!
//! A manifest (`sw-description`) is parsed by an existing grammar crate into
//! an in-memory tree. This module reads that tree through one interface,
//! [`DescriptorTree`], with two implementations:
//!
//! - [`JsonTree`] over `serde_json::Value`
//! - [`TomlTree`] over `toml::Value`, a group/setting tree with dotted
//!   path lookup
//!
//! The backend is chosen once, when the manifest is loaded
//! ([`Descriptor::from_path`]). Everything downstream is generic over
//! [`DescriptorTree`] and never asks which backend it has.
//!
//! # Aliases
//!
//! A container node holding a string field `ref` is an alias: [`find_root`]
//! follows it to another path. Recursion is bounded by an explicit depth
//! budget, so a cyclic chain of aliases resolves to `None` instead of
//! overflowing the stack.
//!
//! [`find_root`]: DescriptorTree::find_root

mod json_tree;
mod toml_tree;

pub use json_tree::JsonTree;
pub use toml_tree::TomlTree;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::SW_DESCRIPTION_FILENAME;

/// Alias depth used by the manifest loader.
pub const DEFAULT_FIND_DEPTH: u32 = 10;

/// Native type of a node in the underlying tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Int,
    Int64,
    Float,
    Bool,
    String,
    Array,
    Group,
    Null,
}

impl NativeType {
    pub fn is_numeric(self) -> bool {
        matches!(self, NativeType::Int | NativeType::Int64 | NativeType::Float)
    }

    pub fn is_container(self) -> bool {
        matches!(self, NativeType::Array | NativeType::Group)
    }
}

/// Scalar types a caller can request from [`DescriptorTree::get_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Int64,
    Bool,
    Double,
}

impl FieldType {
    /// Whether a node of `native` type may be read as `self`.
    ///
    /// 32- and 64-bit integers substitute for each other; bool and double
    /// must match exactly.
    pub fn accepts(self, native: NativeType) -> bool {
        match self {
            FieldType::Int | FieldType::Int64 => {
                matches!(native, NativeType::Int | NativeType::Int64)
            }
            FieldType::Bool => native == NativeType::Bool,
            FieldType::Double => native == NativeType::Float,
        }
    }
}

/// A Rust type that [`DescriptorTree::get_field`] can write into.
pub trait FieldValue: Sized {
    const TYPE: FieldType;

    fn read<T: DescriptorTree + ?Sized>(tree: &T, node: &T::Node) -> Option<Self>;
}

impl FieldValue for i32 {
    const TYPE: FieldType = FieldType::Int;

    fn read<T: DescriptorTree + ?Sized>(tree: &T, node: &T::Node) -> Option<Self> {
        tree.as_i64(node).and_then(|v| i32::try_from(v).ok())
    }
}

impl FieldValue for i64 {
    const TYPE: FieldType = FieldType::Int64;

    fn read<T: DescriptorTree + ?Sized>(tree: &T, node: &T::Node) -> Option<Self> {
        tree.as_i64(node)
    }
}

impl FieldValue for u64 {
    const TYPE: FieldType = FieldType::Int64;

    fn read<T: DescriptorTree + ?Sized>(tree: &T, node: &T::Node) -> Option<Self> {
        tree.as_i64(node).and_then(|v| u64::try_from(v).ok())
    }
}

impl FieldValue for bool {
    const TYPE: FieldType = FieldType::Bool;

    fn read<T: DescriptorTree + ?Sized>(tree: &T, node: &T::Node) -> Option<Self> {
        tree.as_bool(node)
    }
}

impl FieldValue for f64 {
    const TYPE: FieldType = FieldType::Double;

    fn read<T: DescriptorTree + ?Sized>(tree: &T, node: &T::Node) -> Option<Self> {
        tree.as_f64(node)
    }
}

/// Typed read access to a parsed manifest tree.
///
/// Backends supply the primitive accessors; the contract operations
/// (`get_field`, `get_field_string`, `is_field_numeric`, `iterate_field`,
/// `get_node`, `find_root`) are provided on top of them so both backends
/// behave identically.
pub trait DescriptorTree {
    type Node;

    /// Root of the tree.
    fn root(&self) -> &Self::Node;

    /// Single-level child lookup by name.
    fn get_child<'a>(&'a self, node: &'a Self::Node, name: &str) -> Option<&'a Self::Node>;

    /// Resolve a field path relative to `node`, using the backend's own
    /// path rules.
    fn lookup<'a>(&'a self, node: &'a Self::Node, path: &str) -> Option<&'a Self::Node>;

    /// Resolve a root-anchored dotted path.
    fn lookup_dotted(&self, path: &str) -> Option<&Self::Node>;

    fn native_type(&self, node: &Self::Node) -> NativeType;

    fn as_str<'a>(&self, node: &'a Self::Node) -> Option<&'a str>;
    fn as_i64(&self, node: &Self::Node) -> Option<i64>;
    fn as_f64(&self, node: &Self::Node) -> Option<f64>;
    fn as_bool(&self, node: &Self::Node) -> Option<bool>;

    /// Named direct children of a group, in document order.
    fn members<'a>(&'a self, node: &'a Self::Node) -> Vec<(&'a str, &'a Self::Node)>;

    /// Elements of a container (array elements or group values).
    fn elements<'a>(&'a self, node: &'a Self::Node) -> Vec<&'a Self::Node>;

    /// Whether `node` is a container that may carry a `ref` alias.
    fn is_alias_container(&self, node: &Self::Node) -> bool;

    /// Number of elements in a container; 0 for scalars.
    fn len(&self, node: &Self::Node) -> usize {
        self.elements(node).len()
    }

    /// Element `index` of a container.
    fn get_elem<'a>(&'a self, node: &'a Self::Node, index: usize) -> Option<&'a Self::Node> {
        self.elements(node).get(index).copied()
    }

    /// Read a typed scalar into `dest`.
    ///
    /// A missing node or a type mismatch leaves `dest` untouched; the
    /// mismatch is logged as a warning. The caller's prior value stays valid.
    fn get_field<V: FieldValue>(&self, node: &Self::Node, path: Option<&str>, dest: &mut V) {
        let Some(elem) = resolve(self, node, path) else {
            return;
        };
        let native = self.native_type(elem);
        if !V::TYPE.accepts(native) {
            warn!(
                "Type mismatch for {} field \"{}\"",
                SW_DESCRIPTION_FILENAME,
                path.unwrap_or_default()
            );
            return;
        }
        match V::read(self, elem) {
            Some(value) => *dest = value,
            None => warn!(
                "Value of {} field \"{}\" out of range",
                SW_DESCRIPTION_FILENAME,
                path.unwrap_or_default()
            ),
        }
    }

    /// String value of the resolved node, only if it is natively a string.
    fn get_field_string<'a>(&'a self, node: &'a Self::Node, path: Option<&str>) -> Option<&'a str> {
        let elem = resolve(self, node, path)?;
        if self.native_type(elem) != NativeType::String {
            return None;
        }
        self.as_str(elem)
    }

    /// True when the resolved node is an integer or floating-point value.
    fn is_field_numeric(&self, node: &Self::Node, path: Option<&str>) -> bool {
        resolve(self, node, path)
            .map(|elem| self.native_type(elem).is_numeric())
            .unwrap_or(false)
    }

    /// Visit the string content of every direct child of `node`.
    ///
    /// Scalar children yield `(name, value)`. Container children yield
    /// `(container-name, element)` once per string element. Non-string
    /// values are skipped.
    fn iterate_field<F>(&self, node: &Self::Node, mut callback: F)
    where
        F: FnMut(&str, &str),
    {
        for (name, child) in self.members(node) {
            if self.native_type(child).is_container() {
                for elem in self.elements(child) {
                    if let Some(s) = self.get_field_string(elem, None) {
                        callback(name, s);
                    }
                }
            } else if let Some(s) = self.get_field_string(child, None) {
                callback(name, s);
            }
        }
    }

    /// Join `segments` with `.` and resolve them from the root. No alias
    /// following.
    fn get_node<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Self::Node> {
        if segments.is_empty() {
            return Some(self.root());
        }
        self.lookup_dotted(&join_segments(segments))
    }

    /// Resolve `segments`, following `ref` aliases at most `max_depth` times.
    ///
    /// Returns `None` when the budget runs out (alias cycle) or when any
    /// lookup along the chain misses.
    fn find_root<S: AsRef<str>>(&self, segments: &[S], max_depth: u32) -> Option<&Self::Node> {
        let mut path: Vec<String> = segments.iter().map(|s| s.as_ref().to_string()).collect();
        let mut depth = max_depth;
        loop {
            if depth == 0 {
                return None;
            }
            let node = self.get_node(&path)?;
            if !self.is_alias_container(node) {
                return Some(node);
            }
            let Some(reference) = self.get_field_string(node, Some("ref")) else {
                return Some(node);
            };
            path = resolve_ref(&path, reference)?;
            depth -= 1;
        }
    }
}

fn resolve<'a, T: DescriptorTree + ?Sized>(
    tree: &'a T,
    node: &'a T::Node,
    path: Option<&str>,
) -> Option<&'a T::Node> {
    match path {
        Some(p) => tree.lookup(node, p),
        None => Some(node),
    }
}

pub(crate) fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

/// Turn the value of a `ref` field into a new root-anchored path.
///
/// - `#./a/b`: relative to the group that holds the alias; `..` climbs
/// - `#/a/b`: absolute
/// - `a.b`: absolute dotted path
///
/// Returns `None` when the reference climbs above the root or is empty.
pub fn resolve_ref<S: AsRef<str>>(current: &[S], reference: &str) -> Option<Vec<String>> {
    let Some(link) = reference.strip_prefix('#') else {
        let segments: Vec<String> = reference
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        return (!segments.is_empty()).then_some(segments);
    };

    let (mut out, rest): (Vec<String>, &str) = match link.strip_prefix('/') {
        Some(rest) => (Vec::new(), rest),
        None => {
            // The alias node itself is the last segment; "." is its parent.
            let parent = current.len().checked_sub(1)?;
            (
                current[..parent]
                    .iter()
                    .map(|s| s.as_ref().to_string())
                    .collect(),
                link,
            )
        }
    };

    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop()?;
            }
            name => out.push(name.to_string()),
        }
    }

    (!out.is_empty()).then_some(out)
}

/// A loaded manifest with its backend chosen at load time.
pub enum Descriptor {
    Json(JsonTree),
    Toml(TomlTree),
}

impl Descriptor {
    /// Parse manifest text, picking the backend from its content.
    ///
    /// Text whose first non-blank character is `{` is JSON; anything else is
    /// read as a TOML group tree.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim_start().starts_with('{') {
            Ok(Descriptor::Json(JsonTree::parse(text)?))
        } else {
            Ok(Descriptor::Toml(TomlTree::parse(text)?))
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing manifest '{}'", path.display()))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Descriptor::Json(_) => "json",
            Descriptor::Toml(_) => "toml",
        }
    }
}
