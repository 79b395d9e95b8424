//! The scene host: maps retained entities onto external Blender objects.
//!
//! `BlenderScene` owns the retained tree and a command writer, and wires
//! both into the reconciler's [`Host`] seam. Every structural mutation the
//! reconciler replays lands here and turns into the matching executor
//! side effects per entity kind:
//!
//! * objects (primitives, lights, cameras, empties) are created eagerly
//!   and parented when both ends hold confirmed handles; a move away
//!   from a handled parent to an unhandled one clears the external
//!   parent,
//! * materials are created eagerly and bound to their owner at attach,
//! * geometry modifiers wait for a handled owner, then create their node
//!   group and compile the operator subtree exactly once,
//! * geometry operators issue nothing on their own; the owning modifier's
//!   compile (or a late materialize) gives them graph handles.
//!
//! A create that the channel never confirms leaves the entity handle-less
//! for its whole life: later attaches, updates and deletes for it degrade
//! to retained-only bookkeeping instead of erroring.

use log::{debug, warn};
use rustc_hash::FxHashSet;

use stagehand_bridge::Bridge;
use stagehand_tree::{
    Entity, GeometryLink, Host, InstanceId, NodeKind, PropMap, PropValue, SceneTree, changed_props,
};

use crate::graph::{compile_graph, materialize_operator, wire_props};
use crate::tables::classify;
use crate::writer::{SceneWriter, generated_name};

/// Deferred deletion side effects, planned against the tree before the
/// subtree is dropped and executed after.
enum Teardown {
    Object(String),
    Material {
        name: String,
        /// Owner to unbind from first; `None` when the owner dies too.
        unbind_from: Option<String>,
    },
    NodeGroup {
        group: String,
        object: Option<String>,
    },
    GraphNode {
        tree: String,
        node: String,
    },
}

pub struct BlenderScene<B: Bridge> {
    tree: SceneTree,
    writer: SceneWriter<B>,
}

impl<B: Bridge> BlenderScene<B> {
    pub fn new(bridge: B) -> Self {
        Self {
            tree: SceneTree::new(),
            writer: SceneWriter::new(bridge),
        }
    }

    pub fn bridge(&self) -> &B {
        self.writer.bridge()
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        self.writer.bridge_mut()
    }

    pub fn into_bridge(self) -> B {
        self.writer.into_bridge()
    }

    fn external_of(&self, id: Option<InstanceId>) -> Option<String> {
        self.tree
            .node(id?)
            .and_then(Entity::as_node)
            .and_then(|node| node.external_name.clone())
    }

    fn link_mut(&mut self, id: InstanceId) -> Option<&mut GeometryLink> {
        self.tree
            .node_mut(id)
            .and_then(Entity::as_node_mut)
            .and_then(|node| node.geometry_mut())
    }

    fn attach_effects(
        &mut self,
        parent: Option<InstanceId>,
        child: InstanceId,
        initial: bool,
        old_parent: Option<InstanceId>,
    ) {
        let Some(kind) = self
            .tree
            .node(child)
            .and_then(Entity::as_node)
            .map(|node| node.kind)
        else {
            return;
        };
        match kind {
            k if k.is_object() => self.attach_object(parent, child, initial, old_parent),
            NodeKind::Material => self.attach_material(parent, child, initial, old_parent),
            NodeKind::GeometryModifier => self.attach_modifier(child),
            NodeKind::GeometryOperator => self.attach_operator(child),
            _ => {}
        }
    }

    /// Object placement. Transforms are absolute, so a reorder among the
    /// same parent's children needs no command at all.
    fn attach_object(
        &mut self,
        parent: Option<InstanceId>,
        child: InstanceId,
        initial: bool,
        old_parent: Option<InstanceId>,
    ) {
        if !initial && parent == old_parent {
            return;
        }
        let Some(child_name) = self.external_of(Some(child)) else {
            return;
        };
        match self.external_of(parent) {
            Some(parent_name) => {
                self.writer.set_parent(&child_name, Some(&parent_name));
            }
            // The new parent holds no handle (the root container or an
            // unmapped entity); a previously set external parent is
            // cleared rather than left stale.
            None => {
                if !initial && self.external_of(old_parent).is_some() {
                    self.writer.set_parent(&child_name, None);
                }
            }
        }
    }

    fn attach_material(
        &mut self,
        parent: Option<InstanceId>,
        child: InstanceId,
        initial: bool,
        old_parent: Option<InstanceId>,
    ) {
        if !initial && parent == old_parent {
            return;
        }
        let Some(material) = self.external_of(Some(child)) else {
            return;
        };
        let Some(object) = self.external_of(parent) else {
            return;
        };
        self.writer.set_material(&object, Some(&material));
    }

    /// First successful attach creates the node group and compiles the
    /// operator subtree into it. Until the owner holds a handle the
    /// modifier stays pending and every prop update retries.
    fn attach_modifier(&mut self, child: InstanceId) {
        let Some(node) = self.tree.node(child).and_then(Entity::as_node) else {
            return;
        };
        if node.geometry().is_some_and(|link| link.attached) {
            return;
        }
        let parent = node.parent;
        let Some(object) = self.external_of(parent) else {
            return;
        };
        let group = format!("Geometry{}", child.raw());
        let Some(confirmed) = self.writer.create_node_group(&group, &object) else {
            return;
        };
        let assignments = compile_graph(&mut self.tree, &mut self.writer, &confirmed, child);
        for (entity, exec) in assignments {
            if let Some(link) = self.link_mut(entity) {
                link.tree = Some(confirmed.clone());
                link.node = Some(exec);
            }
        }
        if let Some(link) = self.link_mut(child) {
            link.tree = Some(confirmed);
            link.attached = true;
        }
    }

    /// An operator attached after its graph compiled joins that graph as
    /// a lone node. Under an uncompiled modifier this is a no-op; the
    /// compile pass will pick the operator up with everything else.
    fn attach_operator(&mut self, child: InstanceId) {
        let already = self
            .tree
            .node(child)
            .and_then(Entity::as_node)
            .and_then(|node| node.geometry())
            .is_some_and(|link| link.node.is_some());
        if already {
            return;
        }
        let Some((modifier, group)) = self.owning_graph(child) else {
            return;
        };
        let outcome = materialize_operator(&mut self.tree, &mut self.writer, &group, modifier, child);
        if let Some((entity, exec)) = outcome {
            if let Some(link) = self.link_mut(entity) {
                link.tree = Some(group);
                link.node = Some(exec);
            }
        }
    }

    /// Nearest ancestor modifier, provided its graph already compiled.
    fn owning_graph(&self, id: InstanceId) -> Option<(InstanceId, String)> {
        let mut cursor = self.tree.parent_of(id);
        while let Some(current) = cursor {
            if let Some(node) = self.tree.node(current).and_then(Entity::as_node) {
                if node.kind == NodeKind::GeometryModifier {
                    let link = node.geometry()?;
                    if !link.attached {
                        return None;
                    }
                    return link.tree.clone().map(|group| (current, group));
                }
            }
            cursor = self.tree.parent_of(current);
        }
        None
    }
}

impl<B: Bridge> Host for BlenderScene<B> {
    fn tree(&self) -> &SceneTree {
        &self.tree
    }

    fn create_node(&mut self, type_name: &str, props: &PropMap) -> InstanceId {
        let kind = classify(type_name);
        let id = self.tree.insert_node(kind, type_name, props.clone());
        let external = match kind {
            NodeKind::Primitive | NodeKind::Light | NodeKind::Camera | NodeKind::Empty => {
                let wire_name = props
                    .get("name")
                    .and_then(PropValue::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| generated_name(type_name, id));
                self.writer.create_object(kind, type_name, &wire_name, props)
            }
            // Material names are always generated; the name prop is an
            // identity key for matching, not a wire name.
            NodeKind::Material => self
                .writer
                .create_material(&format!("Material{}", id.raw()), props),
            // Graph entities act only once attached.
            NodeKind::GeometryModifier | NodeKind::GeometryOperator => None,
            NodeKind::Unknown => {
                warn!("unknown node type {type_name:?}, keeping {id} as a bare container");
                None
            }
        };
        if let Some(name) = external {
            if let Some(node) = self.tree.node_mut(id).and_then(Entity::as_node_mut) {
                node.external_name = Some(name);
            }
        }
        id
    }

    fn create_text(&mut self, text: &str) -> InstanceId {
        self.tree.insert_text(text)
    }

    fn insert_child(
        &mut self,
        parent: Option<InstanceId>,
        child: InstanceId,
        before: Option<InstanceId>,
        initial: bool,
    ) {
        let old_parent = self.tree.parent_of(child);
        self.tree.attach(parent, child, before);
        self.attach_effects(parent, child, initial, old_parent);
    }

    fn remove_child(&mut self, _parent: Option<InstanceId>, child: InstanceId) {
        let subtree = self.tree.subtree_ids(child);
        let doomed: FxHashSet<InstanceId> = subtree.iter().copied().collect();
        let mut plan = Vec::new();
        for &id in &subtree {
            let Some(node) = self.tree.node(id).and_then(Entity::as_node) else {
                continue;
            };
            let surviving_parent = node.parent.filter(|p| !doomed.contains(p));
            match node.kind {
                k if k.is_object() => {
                    if let Some(name) = node.external_name.clone() {
                        plan.push(Teardown::Object(name));
                    }
                }
                NodeKind::Material => {
                    if let Some(name) = node.external_name.clone() {
                        let unbind_from =
                            surviving_parent.and_then(|p| self.external_of(Some(p)));
                        plan.push(Teardown::Material { name, unbind_from });
                    }
                }
                NodeKind::GeometryModifier => {
                    if let Some(group) = node.geometry().and_then(|link| link.tree.clone()) {
                        let object = surviving_parent.and_then(|p| self.external_of(Some(p)));
                        plan.push(Teardown::NodeGroup { group, object });
                    }
                }
                NodeKind::GeometryOperator => {
                    let Some(link) = node.geometry() else { continue };
                    if let (Some(tree), Some(graph_node)) = (link.tree.clone(), link.node.clone()) {
                        plan.push(Teardown::GraphNode {
                            tree,
                            node: graph_node,
                        });
                    }
                }
                _ => {}
            }
        }
        let dropped = self.tree.remove_subtree(child);
        debug!("removed {} entit(ies), {} side effect(s)", dropped.len(), plan.len());
        for step in plan {
            match step {
                Teardown::Object(name) => self.writer.delete_object(&name),
                Teardown::Material { name, unbind_from } => {
                    if let Some(object) = unbind_from {
                        self.writer.set_material(&object, None);
                    }
                    self.writer.delete_material(&name);
                }
                Teardown::NodeGroup { group, object } => {
                    self.writer.delete_node_group(&group, object.as_deref());
                }
                Teardown::GraphNode { tree, node } => {
                    self.writer.delete_graph_node(&tree, &node);
                }
            }
        }
    }

    fn commit_update(&mut self, node: InstanceId, props: &PropMap) {
        let Some(current) = self.tree.node(node).and_then(Entity::as_node) else {
            return;
        };
        let kind = current.kind;
        let old = current.props.clone();
        let external = current.external_name.clone();
        let link = current.geometry().cloned();
        match kind {
            k if k.is_object() => {
                if let Some(name) = &external {
                    self.writer.set_transform(name, &old, props);
                }
            }
            NodeKind::Material => {
                if let Some(name) = &external {
                    self.writer.update_material(name, &old, props);
                }
            }
            NodeKind::GeometryOperator => {
                if let Some((tree, graph_node)) =
                    link.and_then(|l| l.tree.zip(l.node))
                {
                    let patch = wire_props(&changed_props(&old, props));
                    self.writer.update_graph_node(&tree, &graph_node, patch);
                }
            }
            _ => {}
        }
        self.tree.set_props(node, props.clone());
        if kind == NodeKind::GeometryModifier {
            self.attach_modifier(node);
        }
    }

    fn set_text(&mut self, node: InstanceId, text: &str) {
        // Text has no external counterpart; retained-only.
        self.tree.set_text(node, text);
    }

    fn finalize(&mut self) {
        self.tree.publish();
        debug!(
            "committed scene: {} entit(ies), {} root(s)",
            self.tree.len(),
            self.tree.roots().len()
        );
    }
}
