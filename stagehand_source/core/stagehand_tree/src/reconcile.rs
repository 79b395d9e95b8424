//! Two-pass tree reconciliation.
//!
//! [`compute_edits`] diffs the retained tree against a freshly declared one
//! and produces an ordered [`EditScript`]; [`apply_edits`] replays the
//! script through a [`Host`]. Splitting the passes keeps the diff a pure
//! function of (retained, declared) and makes the applied command sequence
//! reproducible: identical inputs always yield an identical script.
//!
//! Children are matched per parent, in declared order: text against the
//! first unmatched text child, nodes against the first unmatched child with
//! the same declared type and the same `name` prop (the `name` prop is the
//! explicit identity key; unnamed siblings pair up by type in order).
//! Entities never migrate between parents: a node declared under a new
//! parent is a fresh mount, the old one a removal.
//!
//! A `Place` edit carries the full declared order of one children list.
//! `Keep` slots form a maximal in-order run of surviving entities; apply
//! leaves them untouched and inserts every `Shift`/`Mount` before the next
//! `Keep`, so anchors are always entities that will not move.

use log::debug;
use rustc_hash::FxHashSet;

use crate::declared::DeclaredLeaf;
use crate::entity::{Entity, InstanceId};
use crate::props::{PropMap, UpdateDecision, compute_update};
use crate::tree::SceneTree;

/// Mutation surface the engine drives. `parent: None` addresses the root
/// container. Each structural edit triggers its external side effects
/// exactly once in the implementation behind this trait.
pub trait Host {
    fn tree(&self) -> &SceneTree;

    /// Creates a retained node (and, kind permitting, its external
    /// counterpart). The entity starts detached.
    fn create_node(&mut self, type_name: &str, props: &PropMap) -> InstanceId;

    fn create_text(&mut self, text: &str) -> InstanceId;

    /// Places `child` before `before` (append when `None`). `initial` is
    /// true for the first placement of a freshly created entity, false for
    /// a repositioning of one that is already attached.
    fn insert_child(
        &mut self,
        parent: Option<InstanceId>,
        child: InstanceId,
        before: Option<InstanceId>,
        initial: bool,
    );

    /// Detaches `child` and disposes of its entire subtree, invoking each
    /// removed entity's deletion side effect exactly once.
    fn remove_child(&mut self, parent: Option<InstanceId>, child: InstanceId);

    /// Applies a changed prop map: per-kind external update first, then the
    /// new props become the retained ones.
    fn commit_update(&mut self, node: InstanceId, props: &PropMap);

    fn set_text(&mut self, node: InstanceId, text: &str);

    /// Root commit finalization; the only point where the published root
    /// snapshot may change.
    fn finalize(&mut self);
}

#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// Survivor already in relative order; never touched.
    Keep(InstanceId),
    /// Survivor that has to move to restore declared order.
    Shift(InstanceId),
    /// Declared subtree with no match; mounted in place.
    Mount(DeclaredLeaf),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    Remove {
        parent: Option<InstanceId>,
        node: InstanceId,
    },
    Place {
        parent: Option<InstanceId>,
        slots: Vec<Slot>,
    },
    Update {
        node: InstanceId,
        props: PropMap,
    },
    SetText {
        node: InstanceId,
        text: String,
    },
}

pub type EditScript = Vec<Edit>;

/// Diff, apply, finalize. One full render of `declared` against the host.
pub fn reconcile<H: Host>(host: &mut H, declared: &[DeclaredLeaf]) {
    let script = compute_edits(host.tree(), declared);
    debug!("reconcile: {} edit(s)", script.len());
    apply_edits(host, script);
    host.finalize();
}

/// Pure diff pass. Does not touch the tree.
pub fn compute_edits(tree: &SceneTree, declared: &[DeclaredLeaf]) -> EditScript {
    let mut script = EditScript::new();
    diff_children(tree, None, declared, &mut script);
    script
}

fn matches_leaf(tree: &SceneTree, id: InstanceId, leaf: &DeclaredLeaf) -> bool {
    match (leaf, tree.node(id)) {
        (DeclaredLeaf::Text(_), Some(Entity::Text(_))) => true,
        (DeclaredLeaf::Node(d), Some(Entity::Node(n))) => {
            n.type_name == d.type_name && n.name_prop() == d.name()
        }
        _ => false,
    }
}

fn diff_children(
    tree: &SceneTree,
    parent: Option<InstanceId>,
    declared: &[DeclaredLeaf],
    script: &mut EditScript,
) {
    let retained = tree.children_of(parent);

    let mut used: FxHashSet<InstanceId> = FxHashSet::default();
    let mut matched: Vec<Option<InstanceId>> = Vec::with_capacity(declared.len());
    for leaf in declared {
        let hit = retained
            .iter()
            .copied()
            .find(|id| !used.contains(id) && matches_leaf(tree, *id, leaf));
        if let Some(id) = hit {
            used.insert(id);
        }
        matched.push(hit);
    }

    // Removals first, in retained order.
    for id in retained {
        if !used.contains(id) {
            script.push(Edit::Remove { parent, node: *id });
        }
    }

    // Placement, only when the surviving order changed or anything mounts.
    let survivors: Vec<InstanceId> = retained
        .iter()
        .copied()
        .filter(|id| used.contains(id))
        .collect();
    let matched_order: Vec<InstanceId> = matched.iter().copied().flatten().collect();
    if matched_order.len() != declared.len() || matched_order != survivors {
        let mut slots = Vec::with_capacity(declared.len());
        let mut last_kept: Option<usize> = None;
        for (leaf, hit) in declared.iter().zip(&matched) {
            match hit {
                Some(id) => {
                    let position = survivors.iter().position(|s| s == id);
                    match position {
                        Some(p) if last_kept.is_none_or(|lk| p > lk) => {
                            last_kept = Some(p);
                            slots.push(Slot::Keep(*id));
                        }
                        _ => slots.push(Slot::Shift(*id)),
                    }
                }
                None => slots.push(Slot::Mount(leaf.clone())),
            }
        }
        script.push(Edit::Place { parent, slots });
    }

    // Prop and text updates for matched pairs.
    for (leaf, hit) in declared.iter().zip(&matched) {
        let Some(id) = hit else {
            continue;
        };
        match (leaf, tree.node(*id)) {
            (DeclaredLeaf::Node(d), Some(Entity::Node(n))) => {
                if compute_update(&n.props, &d.props) == UpdateDecision::NeedsUpdate {
                    script.push(Edit::Update {
                        node: *id,
                        props: d.props.clone(),
                    });
                }
            }
            (DeclaredLeaf::Text(text), Some(Entity::Text(t))) => {
                if t.text != *text {
                    script.push(Edit::SetText {
                        node: *id,
                        text: text.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    // Recurse into matched pairs, declared order. Mounted subtrees need no
    // recursion; apply handles them whole.
    for (leaf, hit) in declared.iter().zip(&matched) {
        if let (DeclaredLeaf::Node(d), Some(id)) = (leaf, hit) {
            diff_children(tree, Some(*id), &d.children, script);
        }
    }
}

/// Replays a script against the host, in order.
pub fn apply_edits<H: Host>(host: &mut H, script: EditScript) {
    for edit in script {
        match edit {
            Edit::Remove { parent, node } => host.remove_child(parent, node),
            Edit::Place { parent, slots } => apply_place(host, parent, &slots),
            Edit::Update { node, props } => host.commit_update(node, &props),
            Edit::SetText { node, text } => host.set_text(node, &text),
        }
    }
}

fn apply_place<H: Host>(host: &mut H, parent: Option<InstanceId>, slots: &[Slot]) {
    for (i, slot) in slots.iter().enumerate() {
        // Keeps never move, so the next one is a stable anchor.
        let anchor = slots[i + 1..].iter().find_map(|s| match s {
            Slot::Keep(id) => Some(*id),
            _ => None,
        });
        match slot {
            Slot::Keep(_) => {}
            Slot::Shift(id) => host.insert_child(parent, *id, anchor, false),
            Slot::Mount(leaf) => mount(host, parent, leaf, anchor),
        }
    }
}

/// Mounts a declared subtree: create the entity, populate it while still
/// detached, then insert it at its anchor. Parents therefore exist (and
/// hold whatever external handle they managed to get) before any child
/// attaches to them.
fn mount<H: Host>(
    host: &mut H,
    parent: Option<InstanceId>,
    leaf: &DeclaredLeaf,
    before: Option<InstanceId>,
) {
    match leaf {
        DeclaredLeaf::Text(text) => {
            let id = host.create_text(text);
            host.insert_child(parent, id, before, true);
        }
        DeclaredLeaf::Node(d) => {
            let id = host.create_node(&d.type_name, &d.props);
            for child in &d.children {
                mount(host, Some(id), child, None);
            }
            host.insert_child(parent, id, before, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declared::DeclaredNode;
    use crate::entity::NodeKind;

    /// Records every host call; external side effects are just log lines.
    struct TestHost {
        tree: SceneTree,
        ops: Vec<String>,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                tree: SceneTree::new(),
                ops: Vec::new(),
            }
        }

        fn ops_of(&self, prefix: &str) -> usize {
            self.ops.iter().filter(|op| op.starts_with(prefix)).count()
        }
    }

    impl Host for TestHost {
        fn tree(&self) -> &SceneTree {
            &self.tree
        }

        fn create_node(&mut self, type_name: &str, props: &PropMap) -> InstanceId {
            let id = self.tree.insert_node(NodeKind::Unknown, type_name, props.clone());
            self.ops.push(format!("create {type_name} {id}"));
            id
        }

        fn create_text(&mut self, text: &str) -> InstanceId {
            let id = self.tree.insert_text(text);
            self.ops.push(format!("text {id}"));
            id
        }

        fn insert_child(
            &mut self,
            parent: Option<InstanceId>,
            child: InstanceId,
            before: Option<InstanceId>,
            initial: bool,
        ) {
            self.tree.attach(parent, child, before);
            let verb = if initial { "insert" } else { "move" };
            self.ops.push(format!("{verb} {child}"));
        }

        fn remove_child(&mut self, _parent: Option<InstanceId>, child: InstanceId) {
            for id in self.tree.subtree_ids(child) {
                self.ops.push(format!("remove {id}"));
            }
            self.tree.remove_subtree(child);
        }

        fn commit_update(&mut self, node: InstanceId, props: &PropMap) {
            self.ops.push(format!("update {node}"));
            self.tree.set_props(node, props.clone());
        }

        fn set_text(&mut self, node: InstanceId, text: &str) {
            self.ops.push(format!("settext {node}"));
            self.tree.set_text(node, text);
        }

        fn finalize(&mut self) {
            self.tree.publish();
            self.ops.push("finalize".to_owned());
        }
    }

    fn leafs(nodes: Vec<DeclaredNode>) -> Vec<DeclaredLeaf> {
        nodes.into_iter().map(DeclaredLeaf::Node).collect()
    }

    fn types_at_root(tree: &SceneTree) -> Vec<String> {
        tree.children_of(None)
            .iter()
            .map(|id| match tree.node(*id) {
                Some(Entity::Node(n)) => n.type_name.clone(),
                Some(Entity::Text(_)) => "#text".to_owned(),
                None => "?".to_owned(),
            })
            .collect()
    }

    #[test]
    fn initial_mount_creates_parents_before_children() {
        let mut host = TestHost::new();
        let scene = leafs(vec![
            DeclaredNode::new("group").child(DeclaredNode::new("cube")),
            DeclaredNode::new("sunLight"),
        ]);
        reconcile(&mut host, &scene);

        assert_eq!(
            host.ops,
            [
                "create group #1",
                "create cube #2",
                "insert #2",
                "insert #1",
                "create sunLight #3",
                "insert #3",
                "finalize",
            ]
        );
        assert_eq!(host.tree.published().len(), 2);
    }

    #[test]
    fn identical_rerender_is_silent_except_finalize() {
        let mut host = TestHost::new();
        let scene = leafs(vec![
            DeclaredNode::new("cube").prop("position", [1.0, 0.0, 0.0]),
        ]);
        reconcile(&mut host, &scene);
        host.ops.clear();

        reconcile(&mut host, &scene);
        assert_eq!(host.ops, ["finalize"]);
    }

    #[test]
    fn prop_change_updates_in_place() {
        let mut host = TestHost::new();
        reconcile(
            &mut host,
            &leafs(vec![DeclaredNode::new("cube").prop("position", [0.0, 0.0, 0.0])]),
        );
        host.ops.clear();

        reconcile(
            &mut host,
            &leafs(vec![DeclaredNode::new("cube").prop("position", [2.0, 0.0, 0.0])]),
        );
        assert_eq!(host.ops, ["update #1", "finalize"]);
    }

    #[test]
    fn type_change_replaces_the_entity() {
        let mut host = TestHost::new();
        reconcile(&mut host, &leafs(vec![DeclaredNode::new("cube")]));
        host.ops.clear();

        reconcile(&mut host, &leafs(vec![DeclaredNode::new("sphere")]));
        assert_eq!(host.ops_of("remove"), 1);
        assert_eq!(host.ops_of("create"), 1);
        assert_eq!(types_at_root(&host.tree), ["sphere"]);
    }

    #[test]
    fn named_children_reorder_without_churn() {
        let mut host = TestHost::new();
        reconcile(
            &mut host,
            &leafs(vec![
                DeclaredNode::new("cube").prop("name", "a"),
                DeclaredNode::new("cube").prop("name", "b"),
                DeclaredNode::new("cube").prop("name", "c"),
            ]),
        );
        host.ops.clear();

        reconcile(
            &mut host,
            &leafs(vec![
                DeclaredNode::new("cube").prop("name", "c"),
                DeclaredNode::new("cube").prop("name", "a"),
                DeclaredNode::new("cube").prop("name", "b"),
            ]),
        );
        assert_eq!(host.ops_of("create"), 0);
        assert_eq!(host.ops_of("remove"), 0);
        assert!(host.ops_of("move") >= 1);

        let names: Vec<_> = host
            .tree
            .children_of(None)
            .iter()
            .map(|id| {
                host.tree
                    .node(*id)
                    .and_then(Entity::as_node)
                    .and_then(|n| n.name_prop().map(str::to_owned))
            })
            .collect();
        assert_eq!(
            names,
            [Some("c".into()), Some("a".into()), Some("b".into())]
        );
    }

    #[test]
    fn insertion_in_the_middle_uses_a_stable_anchor() {
        let mut host = TestHost::new();
        reconcile(
            &mut host,
            &leafs(vec![
                DeclaredNode::new("cube").prop("name", "a"),
                DeclaredNode::new("cube").prop("name", "b"),
            ]),
        );
        host.ops.clear();

        reconcile(
            &mut host,
            &leafs(vec![
                DeclaredNode::new("cube").prop("name", "a"),
                DeclaredNode::new("sphere"),
                DeclaredNode::new("cube").prop("name", "b"),
            ]),
        );
        assert_eq!(host.ops_of("create"), 1);
        assert_eq!(host.ops_of("move"), 0);
        assert_eq!(types_at_root(&host.tree), ["cube", "sphere", "cube"]);
    }

    #[test]
    fn subtree_removal_visits_every_entity_once() {
        let mut host = TestHost::new();
        reconcile(
            &mut host,
            &leafs(vec![
                DeclaredNode::new("group")
                    .child(DeclaredNode::new("cube"))
                    .child(DeclaredNode::new("cube")),
                DeclaredNode::new("camera"),
            ]),
        );
        host.ops.clear();

        reconcile(&mut host, &leafs(vec![DeclaredNode::new("camera")]));
        assert_eq!(host.ops_of("remove"), 3);
        assert_eq!(host.tree.len(), 1);
    }

    #[test]
    fn unnamed_same_type_siblings_update_in_place() {
        let mut host = TestHost::new();
        reconcile(
            &mut host,
            &leafs(vec![
                DeclaredNode::new("cube").prop("position", [0.0, 0.0, 0.0]),
                DeclaredNode::new("cube").prop("position", [1.0, 0.0, 0.0]),
            ]),
        );
        host.ops.clear();

        // Dropping the first cube matches the survivor to the first
        // declared cube; one update, one removal, no creates.
        reconcile(
            &mut host,
            &leafs(vec![DeclaredNode::new("cube").prop("position", [1.0, 0.0, 0.0])]),
        );
        assert_eq!(host.ops_of("create"), 0);
        assert_eq!(host.ops_of("remove"), 1);
        assert_eq!(host.ops_of("update"), 1);
    }

    #[test]
    fn text_children_reconcile_structurally() {
        let mut host = TestHost::new();
        let scene = vec![DeclaredLeaf::Node(
            DeclaredNode::new("empty").child("hello"),
        )];
        reconcile(&mut host, &scene);
        host.ops.clear();

        let scene = vec![DeclaredLeaf::Node(
            DeclaredNode::new("empty").child("goodbye"),
        )];
        reconcile(&mut host, &scene);
        assert_eq!(host.ops, ["settext #2", "finalize"]);
    }

    #[test]
    fn compute_edits_is_deterministic() {
        let mut host = TestHost::new();
        reconcile(
            &mut host,
            &leafs(vec![
                DeclaredNode::new("cube").prop("name", "a"),
                DeclaredNode::new("cube").prop("name", "b"),
            ]),
        );

        let declared = leafs(vec![
            DeclaredNode::new("cube").prop("name", "b"),
            DeclaredNode::new("sphere"),
        ]);
        let first = compute_edits(host.tree(), &declared);
        let second = compute_edits(host.tree(), &declared);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
