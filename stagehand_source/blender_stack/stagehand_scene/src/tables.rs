//! Static declared-type vocabulary.
//!
//! Every map is compile-time (`phf`) and keyed by the ASCII-lowercased
//! declared type. The vocabulary is closed: a type that resolves in none of
//! the maps is [`NodeKind::Unknown`] and never touches the executor.

use phf::phf_map;

use stagehand_tree::NodeKind;

// --- Wire constants ---

/// Pseudo-node the executor resolves to the group output.
pub const OUTPUT_NODE: &str = "__output__";
/// Pseudo-node the executor resolves to the group input.
pub const INPUT_NODE: &str = "__input__";
/// Primary geometry socket name on both ends of a chain link.
pub const GEOMETRY_SOCKET: &str = "Geometry";

pub const DEFAULT_LIGHT_ENERGY: f64 = 1000.0;
pub const DEFAULT_LIGHT_COLOR: [f64; 3] = [1.0, 1.0, 1.0];
pub const DEFAULT_CAMERA_TYPE: &str = "PERSP";
pub const DEFAULT_EMPTY_TYPE: &str = "PLAIN_AXES";

/// Operator props consumed by the graph compiler itself; they never appear
/// in `add_geometry_node` / `update_geometry_node` prop payloads.
pub const RESERVED_PROPS: [&str; 5] = ["connect", "outputSocket", "input", "children", "name"];

#[inline]
pub fn is_reserved_prop(key: &str) -> bool {
    RESERVED_PROPS.contains(&key)
}

// --- Primitives ---

/// Mesh factory behind a primitive declared type.
pub struct PrimitiveSpec {
    /// `shape` field of the creation command.
    pub shape: &'static str,
    /// Shape-specific settings forwarded when authored: (prop key, wire key).
    /// The executor fills its own defaults for anything absent.
    pub extras: &'static [(&'static str, &'static str)],
}

pub static PRIMITIVES: phf::Map<&'static str, PrimitiveSpec> = phf_map! {
    "cube" => PrimitiveSpec { shape: "cube", extras: &[] },
    "plane" => PrimitiveSpec { shape: "plane", extras: &[] },
    "sphere" => PrimitiveSpec {
        shape: "uv_sphere",
        extras: &[("segments", "segments"), ("rings", "rings")],
    },
    "icosphere" => PrimitiveSpec {
        shape: "ico_sphere",
        extras: &[("subdivisions", "subdivisions")],
    },
    "cylinder" => PrimitiveSpec {
        shape: "cylinder",
        extras: &[("vertices", "vertices"), ("radius", "radius"), ("depth", "depth")],
    },
    "cone" => PrimitiveSpec {
        shape: "cone",
        extras: &[("vertices", "vertices"), ("radius", "radius"), ("depth", "depth")],
    },
    "torus" => PrimitiveSpec {
        shape: "torus",
        extras: &[("radius", "radius"), ("minorRadius", "minor_radius")],
    },
    "circle" => PrimitiveSpec {
        shape: "circle",
        extras: &[("vertices", "vertices"), ("radius", "radius")],
    },
    "grid" => PrimitiveSpec {
        shape: "grid",
        extras: &[("xSubdivisions", "x_subdivisions"), ("ySubdivisions", "y_subdivisions")],
    },
    "monkey" => PrimitiveSpec { shape: "monkey", extras: &[] },
    "suzanne" => PrimitiveSpec { shape: "monkey", extras: &[] },
};

// --- Lights, cameras, empties ---

/// Declared light type to Blender light type.
pub static LIGHTS: phf::Map<&'static str, &'static str> = phf_map! {
    "pointlight" => "POINT",
    "sunlight" => "SUN",
    "spotlight" => "SPOT",
    "arealight" => "AREA",
};

/// `projection` prop values on a camera.
pub static CAMERA_PROJECTIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "perspective" => "PERSP",
    "orthographic" => "ORTHO",
    "panoramic" => "PANO",
};

/// `display` prop values on an empty.
pub static EMPTY_DISPLAYS: phf::Map<&'static str, &'static str> = phf_map! {
    "plainaxes" => "PLAIN_AXES",
    "arrows" => "ARROWS",
    "singlearrow" => "SINGLE_ARROW",
    "circle" => "CIRCLE",
    "cube" => "CUBE",
    "sphere" => "SPHERE",
    "cone" => "CONE",
    "image" => "IMAGE",
};

// --- Geometry operators ---

/// How an operator participates in implicit geometry chaining.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// Produces geometry from nothing; becomes the chain head.
    Generator,
    /// Geometry in, geometry out; consumes the chain and continues it.
    Processor,
    /// Non-geometry output; wired only via directives or embedding.
    Value,
}

impl Category {
    /// True for nodes whose main output carries geometry.
    #[inline]
    pub const fn produces_geometry(self) -> bool {
        matches!(self, Category::Generator | Category::Processor)
    }
}

pub struct OperatorSpec {
    /// Node idname on the Blender side, what the executor instantiates.
    pub blender_type: &'static str,
    pub category: Category,
}

const fn generator(blender_type: &'static str) -> OperatorSpec {
    OperatorSpec { blender_type, category: Category::Generator }
}

const fn processor(blender_type: &'static str) -> OperatorSpec {
    OperatorSpec { blender_type, category: Category::Processor }
}

const fn value(blender_type: &'static str) -> OperatorSpec {
    OperatorSpec { blender_type, category: Category::Value }
}

/// The full operator vocabulary. The mesh boolean operation is authored
/// `meshBoolean`; bare `boolean` is the value input.
pub static OPERATORS: phf::Map<&'static str, OperatorSpec> = phf_map! {
    // Mesh and curve generators
    "meshcube" => generator("GeometryNodeMeshCube"),
    "meshcylinder" => generator("GeometryNodeMeshCylinder"),
    "meshcone" => generator("GeometryNodeMeshCone"),
    "meshsphere" => generator("GeometryNodeMeshUVSphere"),
    "meshicosphere" => generator("GeometryNodeMeshIcoSphere"),
    "meshgrid" => generator("GeometryNodeMeshGrid"),
    "meshcircle" => generator("GeometryNodeMeshCircle"),
    "meshline" => generator("GeometryNodeMeshLine"),
    "curveline" => generator("GeometryNodeCurvePrimitiveLine"),
    "curvecircle" => generator("GeometryNodeCurvePrimitiveCircle"),
    "curvestar" => generator("GeometryNodeCurveStar"),
    "curvespiral" => generator("GeometryNodeCurveSpiral"),
    "curvequadrilateral" => generator("GeometryNodeCurvePrimitiveQuadrilateral"),
    "curvebezier" => generator("GeometryNodeCurvePrimitiveBezierSegment"),
    "objectinfo" => generator("GeometryNodeObjectInfo"),
    "collectioninfo" => generator("GeometryNodeCollectionInfo"),

    // Geometry processors
    "transform" => processor("GeometryNodeTransform"),
    "join" => processor("GeometryNodeJoinGeometry"),
    "setposition" => processor("GeometryNodeSetPosition"),
    "setshade" => processor("GeometryNodeSetShadeSmooth"),
    "subdivide" => processor("GeometryNodeSubdivideMesh"),
    "subdividesurf" => processor("GeometryNodeSubdivisionSurface"),
    "extrude" => processor("GeometryNodeExtrudeMesh"),
    "bevel" => processor("GeometryNodeBevel"),
    "triangulate" => processor("GeometryNodeTriangulate"),
    "flip" => processor("GeometryNodeFlipFaces"),
    "merge" => processor("GeometryNodeMergeByDistance"),
    "meshboolean" => processor("GeometryNodeMeshBoolean"),
    "convexhull" => processor("GeometryNodeConvexHull"),
    "duplicate" => processor("GeometryNodeDuplicateElements"),
    "delete" => processor("GeometryNodeDeleteGeometry"),
    "separate" => processor("GeometryNodeSeparateGeometry"),
    "curvetomesh" => processor("GeometryNodeCurveToMesh"),
    "curvetopoints" => processor("GeometryNodeCurveToPoints"),
    "meshtocurve" => processor("GeometryNodeMeshToCurve"),
    "fillcurve" => processor("GeometryNodeFillCurve"),
    "fillet" => processor("GeometryNodeFilletCurve"),
    "resample" => processor("GeometryNodeResampleCurve"),
    "reverse" => processor("GeometryNodeReverseCurve"),
    "trim" => processor("GeometryNodeTrimCurve"),
    "setsplinetype" => processor("GeometryNodeCurveSplineType"),
    "instanceonpoints" => processor("GeometryNodeInstanceOnPoints"),
    "realizeinstances" => processor("GeometryNodeRealizeInstances"),
    "rotateinstances" => processor("GeometryNodeRotateInstances"),
    "scaleinstances" => processor("GeometryNodeScaleInstances"),
    "translateinstances" => processor("GeometryNodeTranslateInstances"),
    "switch" => processor("GeometryNodeSwitch"),
    "storenameattr" => processor("GeometryNodeStoreNamedAttribute"),
    "captureattr" => processor("GeometryNodeCaptureAttribute"),
    "setmaterial" => processor("GeometryNodeSetMaterial"),
    "setmaterialindex" => processor("GeometryNodeSetMaterialIndex"),

    // Value inputs and field math
    "position" => value("GeometryNodeInputPosition"),
    "normal" => value("GeometryNodeInputNormal"),
    "index" => value("GeometryNodeInputIndex"),
    "id" => value("GeometryNodeInputID"),
    "value" => value("ShaderNodeValue"),
    "vector" => value("FunctionNodeInputVector"),
    "integer" => value("FunctionNodeInputInt"),
    "boolean" => value("FunctionNodeInputBool"),
    "color" => value("FunctionNodeInputColor"),
    "math" => value("ShaderNodeMath"),
    "vectormath" => value("ShaderNodeVectorMath"),
    "compare" => value("FunctionNodeCompare"),
    "clamp" => value("ShaderNodeClamp"),
    "maprange" => value("ShaderNodeMapRange"),
    "mix" => value("ShaderNodeMix"),
    "floattoint" => value("FunctionNodeFloatToInt"),
    "noise" => value("ShaderNodeTexNoise"),
    "voronoi" => value("ShaderNodeTexVoronoi"),
    "gradient" => value("ShaderNodeTexGradient"),
    "wave" => value("ShaderNodeTexWave"),
    "musgrave" => value("ShaderNodeTexMusgrave"),
    "random" => value("FunctionNodeRandomValue"),
    "combinexyz" => value("ShaderNodeCombineXYZ"),
    "separatexyz" => value("ShaderNodeSeparateXYZ"),
    "alignrotationtovector" => value("FunctionNodeAlignRotationToVector"),
    "rotatevector" => value("FunctionNodeRotateVector"),
    "namedattr" => value("GeometryNodeInputNamedAttribute"),
    "materialindex" => value("GeometryNodeInputMaterialIndex"),
};

#[inline]
pub fn operator_spec(type_name: &str) -> Option<&'static OperatorSpec> {
    OPERATORS.get(type_name.to_ascii_lowercase().as_str())
}

#[inline]
pub fn primitive_spec(type_name: &str) -> Option<&'static PrimitiveSpec> {
    PRIMITIVES.get(type_name.to_ascii_lowercase().as_str())
}

#[inline]
pub fn light_type(type_name: &str) -> Option<&'static str> {
    LIGHTS.get(type_name.to_ascii_lowercase().as_str()).copied()
}

#[inline]
pub fn camera_type(projection: &str) -> &'static str {
    CAMERA_PROJECTIONS
        .get(projection.to_ascii_lowercase().as_str())
        .copied()
        .unwrap_or(DEFAULT_CAMERA_TYPE)
}

#[inline]
pub fn empty_type(display: &str) -> &'static str {
    EMPTY_DISPLAYS
        .get(display.to_ascii_lowercase().as_str())
        .copied()
        .unwrap_or(DEFAULT_EMPTY_TYPE)
}

/// Resolves a declared type to its external role. Checked once per entity,
/// at creation.
pub fn classify(type_name: &str) -> NodeKind {
    let key = type_name.to_ascii_lowercase();
    let key = key.as_str();
    if key == "material" {
        NodeKind::Material
    } else if key == "geometrynodes" {
        NodeKind::GeometryModifier
    } else if OPERATORS.contains_key(key) {
        NodeKind::GeometryOperator
    } else if PRIMITIVES.contains_key(key) {
        NodeKind::Primitive
    } else if LIGHTS.contains_key(key) {
        NodeKind::Light
    } else if key == "camera" {
        NodeKind::Camera
    } else if key == "empty" || key == "group" {
        NodeKind::Empty
    } else {
        NodeKind::Unknown
    }
}
