//! Property values carried by scene nodes.
//!
//! Declared and retained nodes both store their props as an ordered
//! `PropMap`. Order matters for creation (embedded operator nodes are
//! materialized in declaration order) but never for change detection:
//! [`compute_update`] treats the map as an unordered key set.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::declared::DeclaredNode;

/// Ordered prop-name to value map. Insertion order is declaration order.
pub type PropMap = IndexMap<String, PropValue>;

/// A single prop value.
///
/// `Node` and `Nodes` embed whole operator subtrees as values; they have no
/// wire form and are consumed by the geometry graph compiler instead.
/// `Target` is the structured form of a `connect` destination.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),

    // --- Fixed-size vectors (positions, eulers, scales, colors) ---
    Vec3([f64; 3]),
    Vec4([f64; 4]),

    // --- Containers ---
    List(Vec<PropValue>),

    // --- Embedded operator subtrees ---
    Node(Box<DeclaredNode>),
    Nodes(Vec<DeclaredNode>),

    // --- Structured connect destination ---
    Target { node: String, socket: String },
}

impl PropValue {
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric accessor; integers widen.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int(v) => Some(*v as f64),
            PropValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn as_vec3(&self) -> Option<[f64; 3]> {
        match self {
            PropValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_node(&self) -> Option<&DeclaredNode> {
        match self {
            PropValue::Node(v) => Some(v),
            _ => None,
        }
    }

    /// Embedded subtrees carried by this value, whichever variant holds them.
    pub fn embedded_nodes(&self) -> &[DeclaredNode] {
        match self {
            PropValue::Node(v) => std::slice::from_ref(v),
            PropValue::Nodes(v) => v.as_slice(),
            _ => &[],
        }
    }

    /// Wire conversion. Embedded subtrees and directives have no wire form.
    ///
    /// A `List` converts only when every element does; a non-finite float
    /// has no JSON representation and also yields `None`.
    pub fn to_json(&self) -> Option<JsonValue> {
        match self {
            PropValue::Bool(v) => Some(JsonValue::Bool(*v)),
            PropValue::Int(v) => Some(JsonValue::Number((*v).into())),
            PropValue::Float(v) => JsonNumber::from_f64(*v).map(JsonValue::Number),
            PropValue::Str(v) => Some(JsonValue::String(v.clone())),
            PropValue::Vec3(v) => json_floats(v),
            PropValue::Vec4(v) => json_floats(v),
            PropValue::List(items) => items
                .iter()
                .map(PropValue::to_json)
                .collect::<Option<Vec<_>>>()
                .map(JsonValue::Array),
            PropValue::Node(_) | PropValue::Nodes(_) | PropValue::Target { .. } => None,
        }
    }
}

fn json_floats(values: &[f64]) -> Option<JsonValue> {
    values
        .iter()
        .map(|v| JsonNumber::from_f64(*v).map(JsonValue::Number))
        .collect::<Option<Vec<_>>>()
        .map(JsonValue::Array)
}

/// Converts every wireable entry of `props`, skipping the rest.
pub fn props_to_json(props: &PropMap) -> JsonMap<String, JsonValue> {
    let mut out = JsonMap::new();
    for (key, value) in props {
        if let Some(json) = value.to_json() {
            out.insert(key.clone(), json);
        }
    }
    out
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Str(v) => write!(f, "{v:?}"),
            PropValue::Vec3(v) => write!(f, "[{}, {}, {}]", v[0], v[1], v[2]),
            PropValue::Vec4(v) => write!(f, "[{}, {}, {}, {}]", v[0], v[1], v[2], v[3]),
            PropValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            PropValue::Node(node) => write!(f, "<{}>", node.type_name),
            PropValue::Nodes(nodes) => write!(f, "<{} nodes>", nodes.len()),
            PropValue::Target { node, socket } => write!(f, "{node}.{socket}"),
        }
    }
}

// --- Ergonomic conversions for builders and tests ---

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Int(v as i64)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}

impl From<f32> for PropValue {
    fn from(v: f32) -> Self {
        PropValue::Float(v as f64)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl From<[f64; 3]> for PropValue {
    fn from(v: [f64; 3]) -> Self {
        PropValue::Vec3(v)
    }
}

impl From<[f64; 4]> for PropValue {
    fn from(v: [f64; 4]) -> Self {
        PropValue::Vec4(v)
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(v: Vec<PropValue>) -> Self {
        PropValue::List(v)
    }
}

impl From<DeclaredNode> for PropValue {
    fn from(v: DeclaredNode) -> Self {
        PropValue::Node(Box::new(v))
    }
}

impl From<Vec<DeclaredNode>> for PropValue {
    fn from(v: Vec<DeclaredNode>) -> Self {
        PropValue::Nodes(v)
    }
}

/// Outcome of comparing a retained prop map against a freshly declared one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateDecision {
    NoChange,
    NeedsUpdate,
}

/// Order-independent change detection over the full key set.
///
/// `NoChange` iff both maps hold exactly the same keys and every value
/// compares equal. Scalars compare by value, vectors and lists
/// structurally, embedded subtrees structurally.
pub fn compute_update(old: &PropMap, new: &PropMap) -> UpdateDecision {
    if old.len() != new.len() {
        return UpdateDecision::NeedsUpdate;
    }
    for (key, value) in new {
        if old.get(key) != Some(value) {
            return UpdateDecision::NeedsUpdate;
        }
    }
    UpdateDecision::NoChange
}

/// Entries of `new` that are missing from `old` or hold a different value,
/// in `new`'s declaration order. Keys dropped from `old` do not appear; an
/// update request never mentions them and the executor keeps their last
/// written state.
pub fn changed_props(old: &PropMap, new: &PropMap) -> PropMap {
    let mut out = PropMap::new();
    for (key, value) in new {
        if old.get(key) != Some(value) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}
