//! Geometry node graph compiler.
//!
//! Turns the operator subtree under an attached `geometryNodes` modifier
//! into a wired node DAG. The pipeline is: collect the descendant operators
//! in document order, materialize each one (nodes embedded in prop values
//! inline, wired straight into the prop-named socket), then walk the list
//! once more chaining geometry and applying `connect` directives, and
//! finally route the last geometry node into the output sink unless a
//! directive already did.
//!
//! Everything is planned from retained state first and only then executed
//! against the channel, because executor replies are authoritative: a
//! renamed node must be referenced by its confirmed name in every later
//! link. A run never issues the same link twice.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map as JsonMap, Value as JsonValue};

use stagehand_bridge::{Bridge, SocketRef};
use stagehand_tree::{DeclaredNode, Entity, InstanceId, NodeKind, PropMap, PropValue, SceneTree};

use crate::tables::{Category, GEOMETRY_SOCKET, OUTPUT_NODE, is_reserved_prop, operator_spec};
use crate::writer::{SceneWriter, generated_name};

/// Non-reserved, wire-convertible props of an operator. Embedded subtrees
/// and directives have no wire form and are dropped here.
pub(crate) fn wire_props(props: &PropMap) -> JsonMap<String, JsonValue> {
    let mut out = JsonMap::new();
    for (key, value) in props {
        if is_reserved_prop(key) {
            continue;
        }
        if let Some(json) = value.to_json() {
            out.insert(key.clone(), json);
        }
    }
    out
}

/// Destination of a `connect` directive.
enum ConnectTarget {
    /// `connect: "output"`, the group output sink.
    Sink,
    /// `"Node.Socket"`, a bare node name, or a structured target.
    Named { node: String, socket: String },
}

fn connect_target(value: &PropValue) -> Option<ConnectTarget> {
    match value {
        PropValue::Str(s) if s == "output" => Some(ConnectTarget::Sink),
        PropValue::Str(s) => {
            let (node, socket) = match s.split_once('.') {
                Some((node, socket)) => (node.to_owned(), socket.to_owned()),
                None => (s.clone(), GEOMETRY_SOCKET.to_owned()),
            };
            Some(ConnectTarget::Named { node, socket })
        }
        PropValue::Target { node, socket } => Some(ConnectTarget::Named {
            node: node.clone(),
            socket: socket.clone(),
        }),
        _ => None,
    }
}

fn socket_override(value: &PropValue) -> Option<SocketRef> {
    match value {
        PropValue::Str(s) => Some(SocketRef::Name(s.clone())),
        PropValue::Int(i) => u32::try_from(*i).ok().map(SocketRef::Index),
        _ => None,
    }
}

/// Default output socket per category; `outputSocket` overrides it.
fn default_output(category: Category) -> SocketRef {
    match category {
        Category::Value => SocketRef::Index(0),
        _ => SocketRef::Name(GEOMETRY_SOCKET.to_owned()),
    }
}

fn geometry_socket() -> SocketRef {
    SocketRef::Name(GEOMETRY_SOCKET.to_owned())
}

// --- Planning ---

struct OpPlan {
    entity: InstanceId,
    type_name: String,
    node_id: String,
    category: Category,
    wire_props: JsonMap<String, JsonValue>,
    embeds: Vec<EmbedPlan>,
    input: Option<String>,
    connect: Option<ConnectTarget>,
    output_socket: Option<SocketRef>,
}

struct EmbedPlan {
    /// Input socket on the owner, named after the carrying prop.
    socket: String,
    type_name: String,
    node_id: String,
    category: Category,
    wire_props: JsonMap<String, JsonValue>,
    embeds: Vec<EmbedPlan>,
    output_socket: Option<SocketRef>,
}

/// Descendant operator entities of `parent` in document order. Nodes
/// embedded in prop values are not entities and do not appear here.
fn collect_operators(tree: &SceneTree, parent: InstanceId, out: &mut Vec<InstanceId>) {
    for &child in tree.children_of(Some(parent)) {
        if let Some(node) = tree.node(child).and_then(Entity::as_node) {
            if node.kind == NodeKind::GeometryOperator {
                out.push(child);
            }
        }
        collect_operators(tree, child, out);
    }
}

fn operator_plans(tree: &mut SceneTree, ops: &[InstanceId]) -> Vec<OpPlan> {
    let mut plans = Vec::with_capacity(ops.len());
    for &id in ops {
        let Some(node) = tree.node(id).and_then(Entity::as_node) else {
            continue;
        };
        let type_name = node.type_name.clone();
        let props = node.props.clone();
        let node_id = node
            .name_prop()
            .map(str::to_owned)
            .unwrap_or_else(|| generated_name(&type_name, id));
        let Some(spec) = operator_spec(&type_name) else {
            debug!("operator {type_name:?} missing from the vocabulary, skipping {id}");
            continue;
        };
        let embeds = embed_plans(tree, &props);
        plans.push(OpPlan {
            entity: id,
            node_id,
            category: spec.category,
            wire_props: wire_props(&props),
            embeds,
            input: props
                .get("input")
                .and_then(PropValue::as_str)
                .map(str::to_owned),
            connect: props.get("connect").and_then(connect_target),
            output_socket: props.get("outputSocket").and_then(socket_override),
            type_name,
        });
    }
    plans
}

fn embed_plans(tree: &mut SceneTree, props: &PropMap) -> Vec<EmbedPlan> {
    let mut out = Vec::new();
    for (key, value) in props {
        for declared in value.embedded_nodes() {
            if let Some(plan) = embed_plan(tree, key, declared) {
                out.push(plan);
            }
        }
    }
    out
}

fn embed_plan(tree: &mut SceneTree, socket: &str, declared: &DeclaredNode) -> Option<EmbedPlan> {
    let Some(spec) = operator_spec(&declared.type_name) else {
        debug!(
            "embedded node type {:?} missing from the vocabulary, skipping",
            declared.type_name
        );
        return None;
    };
    let node_id = declared
        .name()
        .map(str::to_owned)
        .unwrap_or_else(|| generated_name(&declared.type_name, tree.allocate_id()));
    let embeds = embed_plans(tree, &declared.props);
    Some(EmbedPlan {
        socket: socket.to_owned(),
        type_name: declared.type_name.clone(),
        node_id,
        category: spec.category,
        wire_props: wire_props(&declared.props),
        embeds,
        output_socket: declared.props.get("outputSocket").and_then(socket_override),
    })
}

// --- Execution ---

/// Per-run wiring state: confirmed names, link dedup, chain tracking.
struct WireRun<'g> {
    group: &'g str,
    /// Planned node id to executor-confirmed name, embedded nodes included.
    by_node_id: FxHashMap<String, String>,
    /// Lowercased declared type to confirmed name, collected operators
    /// only, in declaration order.
    by_type: Vec<(String, String)>,
    /// Confirmed name to its effective output socket.
    out_sockets: FxHashMap<String, SocketRef>,
    made: FxHashSet<(String, String, String, String)>,
    sink_connected: FxHashSet<String>,
    last_geo: Option<String>,
}

impl<'g> WireRun<'g> {
    fn new(group: &'g str) -> Self {
        Self {
            group,
            by_node_id: FxHashMap::default(),
            by_type: Vec::new(),
            out_sockets: FxHashMap::default(),
            made: FxHashSet::default(),
            sink_connected: FxHashSet::default(),
            last_geo: None,
        }
    }

    fn register(&mut self, node_id: &str, exec: &str, category: Category, over: Option<SocketRef>) {
        self.by_node_id.insert(node_id.to_owned(), exec.to_owned());
        self.out_sockets
            .insert(exec.to_owned(), over.unwrap_or_else(|| default_output(category)));
    }

    fn output_of(&self, exec: &str) -> SocketRef {
        self.out_sockets
            .get(exec)
            .cloned()
            .unwrap_or_else(geometry_socket)
    }

    /// `"prev"`, then a known node id, then a case-insensitive declared
    /// type (first declaration wins). Anything else passes through as a
    /// literal executor node name.
    fn resolve(&self, raw: &str) -> String {
        if raw == "prev" {
            if let Some(last) = &self.last_geo {
                return last.clone();
            }
        }
        if let Some(exec) = self.by_node_id.get(raw) {
            return exec.clone();
        }
        let lower = raw.to_ascii_lowercase();
        for (type_name, exec) in &self.by_type {
            if *type_name == lower {
                return exec.clone();
            }
        }
        debug!("no graph node named {raw:?}; passing it through");
        raw.to_owned()
    }

    fn wire<B: Bridge>(
        &mut self,
        writer: &mut SceneWriter<B>,
        from: &str,
        from_socket: SocketRef,
        to: &str,
        to_socket: SocketRef,
    ) {
        let key = (
            from.to_owned(),
            from_socket.to_string(),
            to.to_owned(),
            to_socket.to_string(),
        );
        if !self.made.insert(key) {
            return;
        }
        writer.connect(self.group, from, from_socket, to, to_socket);
    }

    /// Creates embedded nodes depth-first and wires each into the
    /// prop-named socket of its owner.
    fn create_embeds<B: Bridge>(
        &mut self,
        writer: &mut SceneWriter<B>,
        owner: &str,
        embeds: &[EmbedPlan],
    ) {
        for embed in embeds {
            let Some(exec) = writer.add_graph_node(
                self.group,
                &embed.type_name,
                &embed.node_id,
                embed.wire_props.clone(),
            ) else {
                continue;
            };
            self.register(&embed.node_id, &exec, embed.category, embed.output_socket.clone());
            self.create_embeds(writer, &exec, &embed.embeds);
            let from_socket = self.output_of(&exec);
            self.wire(
                writer,
                &exec,
                from_socket,
                owner,
                SocketRef::Name(embed.socket.clone()),
            );
        }
    }

    fn apply_connect<B: Bridge>(
        &mut self,
        writer: &mut SceneWriter<B>,
        exec: &str,
        target: &ConnectTarget,
    ) {
        let (to, to_socket) = match target {
            ConnectTarget::Sink => (OUTPUT_NODE.to_owned(), geometry_socket()),
            ConnectTarget::Named { node, socket } => {
                (self.resolve(node), SocketRef::Name(socket.clone()))
            }
        };
        if to == OUTPUT_NODE {
            self.sink_connected.insert(exec.to_owned());
        }
        let from_socket = self.output_of(exec);
        self.wire(writer, exec, from_socket, &to, to_socket);
    }

    fn apply_input<B: Bridge>(&mut self, writer: &mut SceneWriter<B>, exec: &str, source: &str) {
        let from = self.resolve(source);
        let from_socket = self.output_of(&from);
        self.wire(writer, &from, from_socket, exec, geometry_socket());
    }
}

/// Compiles the whole operator subtree of `modifier` into `group`.
/// Returns entity-to-confirmed-name assignments for the operators that
/// were actually created; the caller stores them in the geometry links.
pub fn compile_graph<B: Bridge>(
    tree: &mut SceneTree,
    writer: &mut SceneWriter<B>,
    group: &str,
    modifier: InstanceId,
) -> Vec<(InstanceId, String)> {
    let mut ops = Vec::new();
    collect_operators(tree, modifier, &mut ops);
    let plans = operator_plans(tree, &ops);

    let mut run = WireRun::new(group);
    let mut assignments = Vec::new();
    let mut created: Vec<Option<String>> = Vec::with_capacity(plans.len());

    for plan in &plans {
        let Some(exec) = writer.add_graph_node(
            group,
            &plan.type_name,
            &plan.node_id,
            plan.wire_props.clone(),
        ) else {
            created.push(None);
            continue;
        };
        run.register(&plan.node_id, &exec, plan.category, plan.output_socket.clone());
        run.by_type
            .push((plan.type_name.to_ascii_lowercase(), exec.clone()));
        run.create_embeds(writer, &exec, &plan.embeds);
        assignments.push((plan.entity, exec.clone()));
        created.push(Some(exec));
    }

    for (plan, exec) in plans.iter().zip(&created) {
        let Some(exec) = exec else { continue };
        if let Some(source) = &plan.input {
            run.apply_input(writer, exec, source);
        } else if plan.category == Category::Processor {
            if let Some(last) = run.last_geo.clone() {
                run.wire(writer, &last, geometry_socket(), exec, geometry_socket());
            }
        }
        // Generators take no implicit input; a directive may still feed
        // them. Either way a geometry producer heads the chain from here.
        if plan.category.produces_geometry() {
            run.last_geo = Some(exec.clone());
        }
        if let Some(target) = &plan.connect {
            run.apply_connect(writer, exec, target);
        }
    }

    if let Some(last) = run.last_geo.clone() {
        if !run.sink_connected.contains(&last) {
            run.wire(writer, &last, geometry_socket(), OUTPUT_NODE, geometry_socket());
        }
    }

    debug!(
        "compiled {group}: {} nodes, {} links",
        run.by_node_id.len(),
        run.made.len()
    );
    assignments
}

/// Materializes one operator added to an already-compiled graph: the node,
/// its embedded nodes, and its explicit directives. A late addition has no
/// position in the implicit chain, so no chaining and no sink auto-wire.
pub fn materialize_operator<B: Bridge>(
    tree: &mut SceneTree,
    writer: &mut SceneWriter<B>,
    group: &str,
    modifier: InstanceId,
    operator: InstanceId,
) -> Option<(InstanceId, String)> {
    let mut run = WireRun::new(group);

    // Seed resolution with the graph as it exists now.
    let mut known = Vec::new();
    collect_operators(tree, modifier, &mut known);
    for id in known {
        let Some(node) = tree.node(id).and_then(Entity::as_node) else {
            continue;
        };
        let Some(exec) = node.geometry().and_then(|link| link.node.clone()) else {
            continue;
        };
        if let Some(spec) = operator_spec(&node.type_name) {
            let over = node.props.get("outputSocket").and_then(socket_override);
            run.out_sockets
                .insert(exec.clone(), over.unwrap_or_else(|| default_output(spec.category)));
            run.by_type
                .push((node.type_name.to_ascii_lowercase(), exec.clone()));
        }
        run.by_node_id.insert(exec.clone(), exec);
    }

    let plans = operator_plans(tree, &[operator]);
    let plan = plans.first()?;
    let exec = writer.add_graph_node(
        group,
        &plan.type_name,
        &plan.node_id,
        plan.wire_props.clone(),
    )?;
    run.register(&plan.node_id, &exec, plan.category, plan.output_socket.clone());
    run.create_embeds(writer, &exec, &plan.embeds);
    if let Some(source) = &plan.input {
        run.apply_input(writer, &exec, source);
    }
    if let Some(target) = &plan.connect {
        run.apply_connect(writer, &exec, target);
    }
    debug!("materialized late {} into {group} as {exec}", plan.type_name);
    Some((plan.entity, exec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_bridge::{Command, MemoryChannel};

    fn setup() -> (SceneTree, SceneWriter<MemoryChannel>, InstanceId) {
        let mut tree = SceneTree::new();
        let modifier = tree.insert_node(NodeKind::GeometryModifier, "geometryNodes", PropMap::new());
        tree.attach(None, modifier, None);
        (tree, SceneWriter::new(MemoryChannel::new()), modifier)
    }

    fn operator(tree: &mut SceneTree, parent: InstanceId, ty: &str, props: PropMap) -> InstanceId {
        let id = tree.insert_node(NodeKind::GeometryOperator, ty, props);
        tree.attach(Some(parent), id, None);
        id
    }

    fn link(from: &str, from_socket: SocketRef, to: &str, to_socket: SocketRef) -> Command {
        Command::ConnectGeometryNodes {
            tree: "Geometry1".to_owned(),
            from_node: from.to_owned(),
            from_socket,
            to_node: to.to_owned(),
            to_socket,
        }
    }

    fn geo() -> SocketRef {
        SocketRef::Name("Geometry".to_owned())
    }

    fn connects(commands: &[Command]) -> Vec<&Command> {
        commands
            .iter()
            .filter(|c| matches!(c, Command::ConnectGeometryNodes { .. }))
            .collect()
    }

    #[test]
    fn generator_then_processor_chains_into_the_sink() {
        let (mut tree, mut writer, modifier) = setup();
        operator(&mut tree, modifier, "meshGrid", PropMap::new());
        operator(&mut tree, modifier, "setPosition", PropMap::new());

        let assignments = compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        assert_eq!(assignments.len(), 2);

        let commands = writer.bridge_mut().take();
        let wires = connects(&commands);
        assert_eq!(wires.len(), 2);
        assert_eq!(
            *wires[0],
            link("MeshGrid2", geo(), "SetPosition3", geo())
        );
        assert_eq!(
            *wires[1],
            link("SetPosition3", geo(), "__output__", geo())
        );
    }

    #[test]
    fn embedded_node_wires_into_the_prop_socket() {
        let (mut tree, mut writer, modifier) = setup();
        operator(&mut tree, modifier, "meshGrid", PropMap::new());
        let mut props = PropMap::new();
        props.insert(
            "Instance".to_owned(),
            PropValue::Node(Box::new(DeclaredNode::new("meshCube"))),
        );
        operator(&mut tree, modifier, "instanceOnPoints", props);

        let assignments = compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        // The embedded cube is no entity, so only two assignments.
        assert_eq!(assignments.len(), 2);

        let commands = writer.bridge_mut().take();
        let adds = commands
            .iter()
            .filter(|c| matches!(c, Command::AddGeometryNode { .. }))
            .count();
        assert_eq!(adds, 3);

        let wires = connects(&commands);
        assert_eq!(wires.len(), 3);
        // Embedded wiring happens at creation, before any chaining.
        assert_eq!(
            *wires[0],
            link(
                "MeshCube4",
                geo(),
                "InstanceOnPoints3",
                SocketRef::Name("Instance".to_owned())
            )
        );
        assert_eq!(
            *wires[1],
            link("MeshGrid2", geo(), "InstanceOnPoints3", geo())
        );
        assert_eq!(
            *wires[2],
            link("InstanceOnPoints3", geo(), "__output__", geo())
        );
    }

    #[test]
    fn connect_output_suppresses_the_auto_wire() {
        let (mut tree, mut writer, modifier) = setup();
        let mut props = PropMap::new();
        props.insert("connect".to_owned(), PropValue::Str("output".to_owned()));
        operator(&mut tree, modifier, "meshCube", props);

        compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        let commands = writer.bridge_mut().take();
        let wires = connects(&commands);
        assert_eq!(wires.len(), 1);
        assert_eq!(*wires[0], link("MeshCube2", geo(), "__output__", geo()));
    }

    #[test]
    fn value_node_feeds_prev_by_index() {
        let (mut tree, mut writer, modifier) = setup();
        operator(&mut tree, modifier, "meshCube", PropMap::new());
        operator(&mut tree, modifier, "transform", PropMap::new());
        let mut props = PropMap::new();
        props.insert(
            "connect".to_owned(),
            PropValue::Str("prev.Translation".to_owned()),
        );
        operator(&mut tree, modifier, "noise", props);

        compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        let commands = writer.bridge_mut().take();
        let wires = connects(&commands);
        assert_eq!(wires.len(), 3);
        assert_eq!(*wires[0], link("MeshCube2", geo(), "Transform3", geo()));
        // The value node leaves the chain alone and wires output index 0.
        assert_eq!(
            *wires[1],
            link(
                "Noise4",
                SocketRef::Index(0),
                "Transform3",
                SocketRef::Name("Translation".to_owned())
            )
        );
        assert_eq!(*wires[2], link("Transform3", geo(), "__output__", geo()));
    }

    #[test]
    fn input_directive_overrides_the_implicit_chain() {
        let (mut tree, mut writer, modifier) = setup();
        let mut named = PropMap::new();
        named.insert("name".to_owned(), PropValue::Str("base".to_owned()));
        operator(&mut tree, modifier, "meshCube", named);
        operator(&mut tree, modifier, "meshGrid", PropMap::new());
        let mut props = PropMap::new();
        props.insert("input".to_owned(), PropValue::Str("base".to_owned()));
        operator(&mut tree, modifier, "join", props);
        let mut by_type = PropMap::new();
        by_type.insert("input".to_owned(), PropValue::Str("meshGrid".to_owned()));
        operator(&mut tree, modifier, "setShade", by_type);

        compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        let commands = writer.bridge_mut().take();
        let wires = connects(&commands);
        assert_eq!(wires.len(), 3);
        // join reads the named cube, not the grid the chain would pick.
        assert_eq!(*wires[0], link("base", geo(), "Join4", geo()));
        // setShade resolves the declared type case-insensitively.
        assert_eq!(*wires[1], link("MeshGrid3", geo(), "SetShade5", geo()));
        assert_eq!(*wires[2], link("SetShade5", geo(), "__output__", geo()));
    }

    #[test]
    fn unresolvable_target_passes_through_and_fans_out() {
        let (mut tree, mut writer, modifier) = setup();
        let mut props = PropMap::new();
        props.insert(
            "connect".to_owned(),
            PropValue::Str("Whatever.Scale".to_owned()),
        );
        operator(&mut tree, modifier, "meshCube", props);

        compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        let commands = writer.bridge_mut().take();
        let wires = connects(&commands);
        // Explicit target and the implicit sink wire both go out.
        assert_eq!(wires.len(), 2);
        assert_eq!(
            *wires[0],
            link(
                "MeshCube2",
                geo(),
                "Whatever",
                SocketRef::Name("Scale".to_owned())
            )
        );
        assert_eq!(*wires[1], link("MeshCube2", geo(), "__output__", geo()));
    }

    #[test]
    fn repeated_links_are_issued_once() {
        let (mut tree, mut writer, modifier) = setup();
        let mut cube = PropMap::new();
        cube.insert("name".to_owned(), PropValue::Str("base".to_owned()));
        cube.insert(
            "connect".to_owned(),
            PropValue::Str("join.Geometry".to_owned()),
        );
        operator(&mut tree, modifier, "meshCube", cube);
        operator(&mut tree, modifier, "meshGrid", PropMap::new());
        let mut join = PropMap::new();
        join.insert("input".to_owned(), PropValue::Str("base".to_owned()));
        operator(&mut tree, modifier, "join", join);

        compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        let commands = writer.bridge_mut().take();
        let wires = connects(&commands);
        // The connect directive and the input directive describe the same
        // link; it goes out once, plus the final sink wire.
        assert_eq!(wires.len(), 2);
        assert_eq!(*wires[0], link("base", geo(), "Join4", geo()));
        assert_eq!(*wires[1], link("Join4", geo(), "__output__", geo()));
    }

    #[test]
    fn identical_subtrees_compile_identically() {
        let build = || {
            let (mut tree, mut writer, modifier) = setup();
            operator(&mut tree, modifier, "meshGrid", PropMap::new());
            let mut props = PropMap::new();
            props.insert(
                "Instance".to_owned(),
                PropValue::Node(Box::new(DeclaredNode::new("meshCube"))),
            );
            operator(&mut tree, modifier, "instanceOnPoints", props);
            compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
            writer.into_bridge().commands
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn late_materialize_skips_chaining() {
        let (mut tree, mut writer, modifier) = setup();
        let cube = operator(&mut tree, modifier, "meshCube", PropMap::new());
        compile_graph(&mut tree, &mut writer, "Geometry1", modifier);
        if let Some(node) = tree.node_mut(cube).and_then(Entity::as_node_mut) {
            if let Some(link) = node.geometry_mut() {
                link.tree = Some("Geometry1".to_owned());
                link.node = Some("MeshCube2".to_owned());
            }
        }
        writer.bridge_mut().take();

        let mut props = PropMap::new();
        props.insert(
            "connect".to_owned(),
            PropValue::Str("meshCube.Scale".to_owned()),
        );
        let noise = operator(&mut tree, modifier, "noise", props);
        let outcome = materialize_operator(&mut tree, &mut writer, "Geometry1", modifier, noise);
        let (entity, exec) = outcome.unwrap();
        assert_eq!(entity, noise);
        assert_eq!(exec, "Noise3");

        let commands = writer.bridge_mut().take();
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[1],
            link(
                "Noise3",
                SocketRef::Index(0),
                "MeshCube2",
                SocketRef::Name("Scale".to_owned())
            )
        );
    }
}
