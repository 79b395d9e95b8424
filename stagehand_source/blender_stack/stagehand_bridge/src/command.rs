//! Wire protocol records.
//!
//! Every request is one JSON object with a `type` discriminant; field names
//! here are exactly what the executor reads, camelCase included. Commands
//! that patch existing state (`set_transform`, `update_material`) carry only
//! the fields that changed; absent means untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// A socket reference: numeric index or socket name. The executor resolves
/// names first, then digit strings, then falls back to the first socket.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SocketRef {
    Index(u32),
    Name(String),
}

impl From<u32> for SocketRef {
    fn from(v: u32) -> Self {
        SocketRef::Index(v)
    }
}

impl From<&str> for SocketRef {
    fn from(v: &str) -> Self {
        SocketRef::Name(v.to_owned())
    }
}

impl From<String> for SocketRef {
    fn from(v: String) -> Self {
        SocketRef::Name(v)
    }
}

impl fmt::Display for SocketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketRef::Index(i) => write!(f, "{i}"),
            SocketRef::Name(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    CreatePrimitive {
        shape: String,
        name: String,
        location: [f64; 3],
        rotation: [f64; 3],
        scale: [f64; 3],
        /// Shape-specific settings (segments, subdivisions, radius, ...).
        #[serde(flatten)]
        extras: JsonMap<String, JsonValue>,
    },
    CreateLight {
        name: String,
        location: [f64; 3],
        rotation: [f64; 3],
        light_type: String,
        energy: f64,
        color: [f64; 3],
    },
    CreateCamera {
        name: String,
        location: [f64; 3],
        rotation: [f64; 3],
        camera_type: String,
    },
    CreateEmpty {
        name: String,
        location: [f64; 3],
        rotation: [f64; 3],
        scale: [f64; 3],
        empty_type: String,
    },
    SetTransform {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<[f64; 3]>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rotation_euler: Option<[f64; 3]>,
        #[serde(skip_serializing_if = "Option::is_none")]
        scale: Option<[f64; 3]>,
    },
    SetParent {
        child: String,
        /// Absent unparents the child.
        #[serde(skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
    },
    DeleteObject {
        name: String,
    },
    CreateMaterial {
        name: String,
        #[serde(flatten)]
        fields: MaterialFields,
    },
    UpdateMaterial {
        name: String,
        #[serde(flatten)]
        fields: MaterialFields,
    },
    SetMaterial {
        object: String,
        /// Absent clears every material slot on the object.
        #[serde(skip_serializing_if = "Option::is_none")]
        material: Option<String>,
    },
    DeleteMaterial {
        name: String,
    },
    CreateGeometryNodes {
        name: String,
        object: String,
    },
    AddGeometryNode {
        tree: String,
        #[serde(rename = "nodeType")]
        node_type: String,
        #[serde(rename = "nodeId")]
        node_id: String,
        props: JsonMap<String, JsonValue>,
    },
    UpdateGeometryNode {
        tree: String,
        #[serde(rename = "nodeId")]
        node_id: String,
        props: JsonMap<String, JsonValue>,
    },
    ConnectGeometryNodes {
        tree: String,
        #[serde(rename = "fromNode")]
        from_node: String,
        #[serde(rename = "fromSocket")]
        from_socket: SocketRef,
        #[serde(rename = "toNode")]
        to_node: String,
        #[serde(rename = "toSocket")]
        to_socket: SocketRef,
    },
    DeleteGeometryNode {
        tree: String,
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    DeleteGeometryNodes {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        object: Option<String>,
    },
}

/// Principled BSDF inputs the executor knows how to set. `color` and
/// `emission` accept RGB or RGBA; the executor pads the alpha.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MaterialFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metallic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emission: Option<Vec<f64>>,
    #[serde(rename = "emissionStrength", skip_serializing_if = "Option::is_none")]
    pub emission_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ior: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specular: Option<f64>,
}

impl MaterialFields {
    pub fn is_empty(&self) -> bool {
        self == &MaterialFields::default()
    }
}

/// Executor reply. Creations answer with the authoritative `name` (the
/// executor may have deduplicated the requested one); `create_geometry_nodes`
/// adds the modifier name; everything else is a bare ack.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub modifier: Option<String>,
    #[serde(default)]
    pub location: Option<[f64; 3]>,
    #[serde(default)]
    pub success: bool,
}

impl Reply {
    pub fn named(name: impl Into<String>) -> Self {
        Reply {
            name: Some(name.into()),
            ..Reply::default()
        }
    }

    pub fn ok() -> Self {
        Reply {
            success: true,
            ..Reply::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_primitive_wire_shape() {
        let mut extras = JsonMap::new();
        extras.insert("segments".into(), json!(48));
        extras.insert("rings".into(), json!(24));
        let cmd = Command::CreatePrimitive {
            shape: "uv_sphere".into(),
            name: "Sphere1".into(),
            location: [0.0, 0.0, 2.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
            extras,
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "type": "create_primitive",
                "shape": "uv_sphere",
                "name": "Sphere1",
                "location": [0.0, 0.0, 2.0],
                "rotation": [0.0, 0.0, 0.0],
                "scale": [1.0, 1.0, 1.0],
                "segments": 48,
                "rings": 24,
            })
        );
    }

    #[test]
    fn geometry_fields_keep_camel_case() {
        let cmd = Command::ConnectGeometryNodes {
            tree: "Geometry7".into(),
            from_node: "MeshGrid8".into(),
            from_socket: "Geometry".into(),
            to_node: "__output__".into(),
            to_socket: SocketRef::Index(0),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "type": "connect_geometry_nodes",
                "tree": "Geometry7",
                "fromNode": "MeshGrid8",
                "fromSocket": "Geometry",
                "toNode": "__output__",
                "toSocket": 0,
            })
        );
    }

    #[test]
    fn patch_commands_omit_untouched_fields() {
        let cmd = Command::SetTransform {
            name: "Cube1".into(),
            location: Some([1.0, 0.0, 0.0]),
            rotation_euler: None,
            scale: None,
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"type": "set_transform", "name": "Cube1", "location": [1.0, 0.0, 0.0]})
        );

        let cmd = Command::UpdateMaterial {
            name: "Material3".into(),
            fields: MaterialFields {
                roughness: Some(0.25),
                emission_strength: Some(2.0),
                ..MaterialFields::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "type": "update_material",
                "name": "Material3",
                "roughness": 0.25,
                "emissionStrength": 2.0,
            })
        );

        let cmd = Command::SetParent {
            child: "Cube1".into(),
            parent: None,
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"type": "set_parent", "child": "Cube1"})
        );
    }

    #[test]
    fn replies_parse_all_executor_shapes() {
        let created: Reply =
            serde_json::from_str(r#"{"name": "Cube1", "location": [0.0, 0.0, 0.0]}"#).unwrap();
        assert_eq!(created.name.as_deref(), Some("Cube1"));
        assert!(!created.success);

        let modifier: Reply =
            serde_json::from_str(r#"{"name": "Geometry5", "modifier": "Geometry5"}"#).unwrap();
        assert_eq!(modifier.modifier.as_deref(), Some("Geometry5"));

        let ack: Reply = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(ack.success && ack.name.is_none());
    }
}
