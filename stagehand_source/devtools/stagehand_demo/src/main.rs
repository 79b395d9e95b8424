//! Renders a small animated scene against the in-memory channel and dumps
//! every command the reconciler emits, one JSON line each. Useful for
//! eyeballing what a frame costs without a running executor.

use std::env;

use log::info;

use stagehand_bridge::MemoryChannel;
use stagehand_scene::BlenderScene;
use stagehand_tree::{DeclaredLeaf, DeclaredNode, reconcile};

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).cloned()
}

/// The modifier subtree: a grid scattered with small cubes. Later frames
/// grow a noise input driving the instance scale.
fn scatter(frame: u32) -> DeclaredNode {
    let mut modifier = DeclaredNode::new("geometryNodes")
        .child(DeclaredNode::new("meshGrid").prop("name", "field"))
        .child(
            DeclaredNode::new("instanceOnPoints")
                .prop("Instance", DeclaredNode::new("meshCube").prop("Size", 0.2)),
        );
    if frame > 1 {
        modifier = modifier.child(
            DeclaredNode::new("noise")
                .prop("name", "grain")
                .prop("connect", "instanceOnPoints.Scale"),
        );
    }
    modifier
}

fn declared_scene(frame: u32) -> Vec<DeclaredLeaf> {
    let t = f64::from(frame);
    let mut nodes = vec![
        DeclaredNode::new("camera")
            .prop("name", "shot")
            .prop("position", [6.0, -6.0, 4.0])
            .prop("rotation", [1.1, 0.0, 0.8]),
        DeclaredNode::new("sunlight")
            .prop("name", "key")
            .prop("energy", 3.0)
            .prop("rotation", [0.6, 0.0, 0.4]),
        DeclaredNode::new("cube")
            .prop("name", "hero")
            .prop("position", [0.0, 0.0, 0.5 * t])
            .child(
                DeclaredNode::new("material")
                    .prop("color", [0.8, 0.2 + 0.1 * t, 0.1, 1.0])
                    .prop("roughness", 0.4),
            )
            .child(scatter(frame)),
    ];
    if frame > 0 {
        nodes.push(
            DeclaredNode::new("sphere")
                .prop("name", "probe")
                .prop("position", [3.0, 0.0, 1.0]),
        );
    }
    nodes.into_iter().map(DeclaredLeaf::from).collect()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();

    let args: Vec<String> = env::args().collect();
    let frames: u32 = parse_flag_value(&args, "--frames")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(3);
    info!("rendering {frames} frame(s)");

    let mut scene = BlenderScene::new(MemoryChannel::new());
    for frame in 0..frames {
        reconcile(&mut scene, &declared_scene(frame));
        let commands = scene.bridge_mut().take();
        println!("# frame {frame}: {} command(s)", commands.len());
        for command in commands {
            match serde_json::to_string(&command) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("skipping unserializable command: {err}"),
            }
        }
    }
}
