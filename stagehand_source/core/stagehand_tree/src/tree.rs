//! The retained tree: an arena of entities plus the root container.
//!
//! `SceneTree` is purely structural. It never talks to the external world;
//! the scene host layers mapper side effects on top of these operations.

use indexmap::IndexMap;

use crate::entity::{Entity, InstanceId, Node, NodeKind, TextNode};
use crate::props::PropMap;

pub struct SceneTree {
    nodes: IndexMap<InstanceId, Entity>,
    /// Ordered children of the root container.
    roots: Vec<InstanceId>,
    /// Snapshot of `roots` as of the last commit finalization. Consumers
    /// read this, never `roots` directly.
    published: Vec<InstanceId>,
    next_id: u64,
}

impl SceneTree {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            roots: Vec::new(),
            published: Vec::new(),
            next_id: 1,
        }
    }

    fn alloc(&mut self) -> InstanceId {
        let id = InstanceId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert_node(&mut self, kind: NodeKind, type_name: &str, props: PropMap) -> InstanceId {
        let id = self.alloc();
        self.nodes
            .insert(id, Entity::Node(Node::new(id, kind, type_name, props)));
        id
    }

    pub fn insert_text(&mut self, text: &str) -> InstanceId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Entity::Text(TextNode {
                id,
                text: text.to_owned(),
                parent: None,
            }),
        );
        id
    }

    /// Burns an id with no entity behind it. Generated names for graph
    /// nodes embedded in prop values draw from the same sequence as
    /// entities, so the two never collide.
    pub fn allocate_id(&mut self) -> InstanceId {
        self.alloc()
    }

    /// Places `child` under `parent` (`None` = root container) before
    /// `before`, or at the end. A child already placed elsewhere is moved;
    /// a missing anchor degrades to an append.
    pub fn attach(&mut self, parent: Option<InstanceId>, child: InstanceId, before: Option<InstanceId>) {
        if !self.nodes.contains_key(&child) {
            return;
        }
        self.unlink(child);

        let slot = {
            let siblings = self.children_of(parent);
            before
                .and_then(|anchor| siblings.iter().position(|c| *c == anchor))
                .unwrap_or(siblings.len())
        };

        match parent {
            None => self.roots.insert(slot, child),
            Some(p) => {
                let Some(node) = self.nodes.get_mut(&p).and_then(Entity::as_node_mut) else {
                    return;
                };
                node.children.insert(slot, child);
            }
        }
        if let Some(entity) = self.nodes.get_mut(&child) {
            entity.set_parent(parent);
        }
    }

    /// Removes `child` from whichever children list currently holds it.
    fn unlink(&mut self, child: InstanceId) {
        let Some(entity) = self.nodes.get(&child) else {
            return;
        };
        match entity.parent() {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p).and_then(Entity::as_node_mut) {
                    node.children.retain(|c| *c != child);
                }
            }
            None => self.roots.retain(|c| *c != child),
        }
        if let Some(entity) = self.nodes.get_mut(&child) {
            entity.set_parent(None);
        }
    }

    /// Ids of `id` and every descendant, parent before children.
    pub fn subtree_ids(&self, id: InstanceId) -> Vec<InstanceId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(entity) = self.nodes.get(&current) else {
                continue;
            };
            out.push(current);
            // Reverse push keeps document order on the stack.
            for child in entity.children().iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Detaches `child` and drops its whole subtree from the arena.
    /// Returns every removed id exactly once, parent before children.
    /// Freed ids are never reallocated.
    pub fn remove_subtree(&mut self, child: InstanceId) -> Vec<InstanceId> {
        let ids = self.subtree_ids(child);
        if ids.is_empty() {
            return ids;
        }
        self.unlink(child);
        for id in &ids {
            self.nodes.shift_remove(id);
        }
        ids
    }

    #[inline]
    pub fn node(&self, id: InstanceId) -> Option<&Entity> {
        self.nodes.get(&id)
    }

    #[inline]
    pub fn node_mut(&mut self, id: InstanceId) -> Option<&mut Entity> {
        self.nodes.get_mut(&id)
    }

    pub fn children_of(&self, parent: Option<InstanceId>) -> &[InstanceId] {
        match parent {
            None => &self.roots,
            Some(p) => self
                .nodes
                .get(&p)
                .map(Entity::children)
                .unwrap_or(&[]),
        }
    }

    pub fn parent_of(&self, id: InstanceId) -> Option<InstanceId> {
        self.nodes.get(&id).and_then(Entity::parent)
    }

    pub fn set_props(&mut self, id: InstanceId, props: PropMap) {
        if let Some(node) = self.nodes.get_mut(&id).and_then(Entity::as_node_mut) {
            node.props = props;
        }
    }

    pub fn set_text(&mut self, id: InstanceId, text: &str) {
        if let Some(Entity::Text(t)) = self.nodes.get_mut(&id) {
            text.clone_into(&mut t.text);
        }
    }

    /// Root commit finalization: refreshes the published snapshot.
    pub fn publish(&mut self) {
        self.published.clear();
        self.published.extend_from_slice(&self.roots);
    }

    #[inline]
    pub fn published(&self) -> &[InstanceId] {
        &self.published
    }

    #[inline]
    pub fn roots(&self) -> &[InstanceId] {
        &self.roots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.nodes.values()
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}
