//! Entity lifecycle to wire commands.
//!
//! `SceneWriter` owns the channel and plans one command (or none) per
//! lifecycle event, per node kind. It never touches the retained tree; the
//! scene host extracts whatever the writer needs and stores whatever it
//! returns. Replies are authoritative: the executor may rename on collision,
//! so every later command uses the name it confirmed.

use log::debug;
use serde_json::{Map as JsonMap, Value as JsonValue};

use stagehand_bridge::{Bridge, Command, MaterialFields, SocketRef};
use stagehand_tree::{InstanceId, NodeKind, PropMap, PropValue, changed_props};

use crate::tables::{
    DEFAULT_LIGHT_COLOR, DEFAULT_LIGHT_ENERGY, camera_type, empty_type, light_type,
    primitive_spec,
};

/// Wire name for an entity without an authored `name` prop: the declared
/// type with its first letter upper-cased, then the instance id
/// (`cube` and `#7` give `Cube7`).
pub fn generated_name(type_name: &str, id: InstanceId) -> String {
    let mut out = String::with_capacity(type_name.len() + 4);
    let mut chars = type_name.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
    out.push_str(&id.raw().to_string());
    out
}

fn vec3(props: &PropMap, key: &str) -> Option<[f64; 3]> {
    props.get(key).and_then(PropValue::as_vec3)
}

fn float(props: &PropMap, key: &str) -> Option<f64> {
    props.get(key).and_then(PropValue::as_f64)
}

fn string<'p>(props: &'p PropMap, key: &str) -> Option<&'p str> {
    props.get(key).and_then(PropValue::as_str)
}

/// RGB or RGBA; the executor pads a missing alpha itself.
fn color(props: &PropMap, key: &str) -> Option<Vec<f64>> {
    match props.get(key)? {
        PropValue::Vec3(v) => Some(v.to_vec()),
        PropValue::Vec4(v) => Some(v.to_vec()),
        _ => None,
    }
}

fn material_fields(props: &PropMap) -> MaterialFields {
    MaterialFields {
        color: color(props, "color"),
        metallic: float(props, "metallic"),
        roughness: float(props, "roughness"),
        emission: color(props, "emission"),
        emission_strength: float(props, "emissionStrength"),
        alpha: float(props, "alpha"),
        ior: float(props, "ior"),
        specular: float(props, "specular"),
    }
}

pub struct SceneWriter<B> {
    bridge: B,
}

impl<B: Bridge> SceneWriter<B> {
    pub fn new(bridge: B) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn into_bridge(self) -> B {
        self.bridge
    }

    fn request_name(&mut self, fallback: &str, command: Command) -> Option<String> {
        let reply = self.bridge.request(&command)?;
        Some(reply.name.unwrap_or_else(|| fallback.to_owned()))
    }

    fn request_ack(&mut self, command: Command) -> bool {
        self.bridge.request(&command).is_some()
    }

    // --- Create ---

    /// Creation command for a transformable object kind. Returns the
    /// executor-confirmed name, `None` on a degraded channel (the entity
    /// then stays handle-less for good).
    pub fn create_object(
        &mut self,
        kind: NodeKind,
        type_name: &str,
        wire_name: &str,
        props: &PropMap,
    ) -> Option<String> {
        let location = vec3(props, "position").unwrap_or([0.0; 3]);
        let rotation = vec3(props, "rotation").unwrap_or([0.0; 3]);
        let scale = vec3(props, "scale").unwrap_or([1.0; 3]);
        let command = match kind {
            NodeKind::Primitive => {
                let spec = primitive_spec(type_name)?;
                let mut extras = JsonMap::new();
                for (prop, wire) in spec.extras {
                    if let Some(json) = props.get(*prop).and_then(PropValue::to_json) {
                        extras.insert((*wire).to_owned(), json);
                    }
                }
                Command::CreatePrimitive {
                    shape: spec.shape.to_owned(),
                    name: wire_name.to_owned(),
                    location,
                    rotation,
                    scale,
                    extras,
                }
            }
            NodeKind::Light => Command::CreateLight {
                name: wire_name.to_owned(),
                location,
                rotation,
                light_type: light_type(type_name)?.to_owned(),
                energy: float(props, "energy").unwrap_or(DEFAULT_LIGHT_ENERGY),
                color: vec3(props, "color").unwrap_or(DEFAULT_LIGHT_COLOR),
            },
            NodeKind::Camera => Command::CreateCamera {
                name: wire_name.to_owned(),
                location,
                rotation,
                camera_type: camera_type(string(props, "projection").unwrap_or_default())
                    .to_owned(),
            },
            NodeKind::Empty => Command::CreateEmpty {
                name: wire_name.to_owned(),
                location,
                rotation,
                scale,
                empty_type: empty_type(string(props, "display").unwrap_or_default()).to_owned(),
            },
            _ => return None,
        };
        self.request_name(wire_name, command)
    }

    pub fn create_material(&mut self, wire_name: &str, props: &PropMap) -> Option<String> {
        let command = Command::CreateMaterial {
            name: wire_name.to_owned(),
            fields: material_fields(props),
        };
        self.request_name(wire_name, command)
    }

    /// Creates the node group and hooks it onto `object` as a modifier.
    /// Returns the confirmed group name.
    pub fn create_node_group(&mut self, group: &str, object: &str) -> Option<String> {
        let command = Command::CreateGeometryNodes {
            name: group.to_owned(),
            object: object.to_owned(),
        };
        self.request_name(group, command)
    }

    // --- Attach ---

    pub fn set_parent(&mut self, child: &str, parent: Option<&str>) -> bool {
        self.request_ack(Command::SetParent {
            child: child.to_owned(),
            parent: parent.map(str::to_owned),
        })
    }

    pub fn set_material(&mut self, object: &str, material: Option<&str>) -> bool {
        self.request_ack(Command::SetMaterial {
            object: object.to_owned(),
            material: material.map(str::to_owned),
        })
    }

    // --- Update ---

    /// Transform patch carrying only the changed fields. No request when
    /// nothing in the transform triple changed.
    pub fn set_transform(&mut self, name: &str, old: &PropMap, new: &PropMap) -> bool {
        let changed = changed_props(old, new);
        let location = vec3(&changed, "position");
        let rotation_euler = vec3(&changed, "rotation");
        let scale = vec3(&changed, "scale");
        if location.is_none() && rotation_euler.is_none() && scale.is_none() {
            return false;
        }
        self.request_ack(Command::SetTransform {
            name: name.to_owned(),
            location,
            rotation_euler,
            scale,
        })
    }

    pub fn update_material(&mut self, name: &str, old: &PropMap, new: &PropMap) -> bool {
        let fields = material_fields(&changed_props(old, new));
        if fields.is_empty() {
            return false;
        }
        self.request_ack(Command::UpdateMaterial {
            name: name.to_owned(),
            fields,
        })
    }

    // --- Graph ---

    pub fn add_graph_node(
        &mut self,
        tree: &str,
        node_type: &str,
        node_id: &str,
        props: JsonMap<String, JsonValue>,
    ) -> Option<String> {
        self.request_name(
            node_id,
            Command::AddGeometryNode {
                tree: tree.to_owned(),
                node_type: node_type.to_owned(),
                node_id: node_id.to_owned(),
                props,
            },
        )
    }

    pub fn update_graph_node(
        &mut self,
        tree: &str,
        node_id: &str,
        props: JsonMap<String, JsonValue>,
    ) -> bool {
        if props.is_empty() {
            return false;
        }
        self.request_ack(Command::UpdateGeometryNode {
            tree: tree.to_owned(),
            node_id: node_id.to_owned(),
            props,
        })
    }

    pub fn connect(
        &mut self,
        tree: &str,
        from_node: &str,
        from_socket: SocketRef,
        to_node: &str,
        to_socket: SocketRef,
    ) -> bool {
        self.request_ack(Command::ConnectGeometryNodes {
            tree: tree.to_owned(),
            from_node: from_node.to_owned(),
            from_socket,
            to_node: to_node.to_owned(),
            to_socket,
        })
    }

    // --- Delete ---

    pub fn delete_object(&mut self, name: &str) {
        if !self.request_ack(Command::DeleteObject {
            name: name.to_owned(),
        }) {
            debug!("delete of {name} got no reply");
        }
    }

    pub fn delete_material(&mut self, name: &str) {
        self.request_ack(Command::DeleteMaterial {
            name: name.to_owned(),
        });
    }

    pub fn delete_node_group(&mut self, group: &str, object: Option<&str>) {
        self.request_ack(Command::DeleteGeometryNodes {
            name: group.to_owned(),
            object: object.map(str::to_owned),
        });
    }

    pub fn delete_graph_node(&mut self, tree: &str, node_id: &str) {
        self.request_ack(Command::DeleteGeometryNode {
            tree: tree.to_owned(),
            node_id: node_id.to_owned(),
        });
    }
}
