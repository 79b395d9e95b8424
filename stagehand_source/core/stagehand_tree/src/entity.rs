//! Retained scene entities and their ids.

use std::fmt;

use smallvec::SmallVec;

use crate::props::{PropMap, PropValue};

/// Process-unique entity id. Monotonically increasing, never reused, only
/// ever handed out by [`crate::tree::SceneTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    #[inline]
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// External role of a node, resolved exactly once at creation from the
/// static type tables and never changed afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Primitive,
    Light,
    Camera,
    Empty,
    Material,
    GeometryModifier,
    GeometryOperator,
    /// Unrecognized declared type. Fully tracked in the tree, never mapped
    /// to anything external.
    Unknown,
}

impl NodeKind {
    /// Kinds backed by a transformable scene object, the only ones that
    /// take part in external parent/child transform relationships.
    #[inline]
    pub const fn is_object(self) -> bool {
        matches!(
            self,
            NodeKind::Primitive | NodeKind::Light | NodeKind::Camera | NodeKind::Empty
        )
    }

    #[inline]
    pub const fn is_geometry(self) -> bool {
        matches!(self, NodeKind::GeometryModifier | NodeKind::GeometryOperator)
    }
}

/// External geometry-graph handles. Present only on modifier and operator
/// entities.
///
/// For a modifier, `tree` is the node-group name once created and
/// `attached` flips exactly once, when its graph has been compiled. For an
/// operator, `tree` names the owning group and `node` the executor-side
/// node, both set when the operator is materialized.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryLink {
    pub tree: Option<String>,
    pub node: Option<String>,
    pub attached: bool,
}

type ChildList = SmallVec<[InstanceId; 8]>;

/// A retained scene node.
///
/// Lifecycle: unattached on creation, created once the mapper has had its
/// chance to mirror it externally (which may fail, leaving it handle-less),
/// updated any number of times, detached exactly once on removal.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: InstanceId,
    pub kind: NodeKind,
    /// Declared type, exactly as authored.
    pub type_name: String,
    pub props: PropMap,
    pub children: ChildList,
    /// Weak back-pointer; `None` for entities under the root container.
    pub parent: Option<InstanceId>,
    /// Executor-confirmed object or material name.
    pub external_name: Option<String>,
    pub geometry: Option<GeometryLink>,
}

impl Node {
    pub fn new(id: InstanceId, kind: NodeKind, type_name: &str, props: PropMap) -> Self {
        let geometry = kind.is_geometry().then(GeometryLink::default);
        Self {
            id,
            kind,
            type_name: type_name.to_owned(),
            props,
            children: ChildList::new(),
            parent: None,
            external_name: None,
            geometry,
        }
    }

    /// The authored identity key, if any.
    pub fn name_prop(&self) -> Option<&str> {
        self.props.get("name").and_then(PropValue::as_str)
    }

    #[inline]
    pub fn geometry(&self) -> Option<&GeometryLink> {
        self.geometry.as_ref()
    }

    #[inline]
    pub fn geometry_mut(&mut self) -> Option<&mut GeometryLink> {
        self.geometry.as_mut()
    }
}

/// A retained text leaf. No external counterpart, no children; it exists so
/// structural bookkeeping treats stray text exactly like any other child.
#[derive(Clone, Debug)]
pub struct TextNode {
    pub id: InstanceId,
    pub text: String,
    pub parent: Option<InstanceId>,
}

#[derive(Clone, Debug)]
pub enum Entity {
    Node(Node),
    Text(TextNode),
}

impl Entity {
    #[inline]
    pub fn id(&self) -> InstanceId {
        match self {
            Entity::Node(n) => n.id,
            Entity::Text(t) => t.id,
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<InstanceId> {
        match self {
            Entity::Node(n) => n.parent,
            Entity::Text(t) => t.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<InstanceId>) {
        match self {
            Entity::Node(n) => n.parent = parent,
            Entity::Text(t) => t.parent = parent,
        }
    }

    pub fn children(&self) -> &[InstanceId] {
        match self {
            Entity::Node(n) => &n.children,
            Entity::Text(_) => &[],
        }
    }

    #[inline]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Entity::Node(n) => Some(n),
            Entity::Text(_) => None,
        }
    }

    #[inline]
    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Entity::Node(n) => Some(n),
            Entity::Text(_) => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Entity::Text(t) => Some(t),
            Entity::Node(_) => None,
        }
    }
}
