// Scene preparation front end: loads a JSON scene, builds the BVH and packs
// the GPU buffers, then reports what would be uploaded.
// Run with: cargo run --release -- -i scenes/cornell_box.json -s 4

use anyhow::{bail, Context, Result};
use glrt_core::Scene;
use glrt_renderer::{prepare, BvhConfig};
use std::env;
use std::path::PathBuf;

const DEFAULT_SAMPLES_PER_CYCLE: u32 = 4;

#[derive(Debug, PartialEq)]
struct Args {
    input: PathBuf,
    samples_per_cycle: u32,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} -i <scene.json> [-s <samples per cycle>]",
        program
    )
}

fn parse_args(args: &[String]) -> Result<Args> {
    let program = args.first().map(String::as_str).unwrap_or("glrt");
    let mut input = None;
    let mut samples_per_cycle = DEFAULT_SAMPLES_PER_CYCLE;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" | "--input" => {
                let value = iter
                    .next()
                    .with_context(|| format!("{} requires a value\n{}", arg, usage(program)))?;
                input = Some(PathBuf::from(value));
            }
            "-s" | "--sample-per-cycle" => {
                let value = iter
                    .next()
                    .with_context(|| format!("{} requires a value\n{}", arg, usage(program)))?;
                samples_per_cycle = value
                    .parse()
                    .with_context(|| format!("Invalid sample count: {}", value))?;
                if samples_per_cycle == 0 {
                    bail!("Sample count must be at least 1");
                }
            }
            other => bail!("Unknown argument: {}\n{}", other, usage(program)),
        }
    }

    let Some(input) = input else {
        bail!("Missing input scene\n{}", usage(program));
    };

    Ok(Args {
        input,
        samples_per_cycle,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let argv: Vec<String> = env::args().collect();
    let args = parse_args(&argv)?;

    log::info!("Loading scene: {}", args.input.display());
    log::info!("Samples per cycle: {}", args.samples_per_cycle);

    let scene = Scene::load(&args.input)
        .with_context(|| format!("Failed to load scene {}", args.input.display()))?;
    let prepared = prepare(&scene, &BvhConfig::default())
        .with_context(|| format!("Failed to prepare scene {}", scene.name))?;

    println!("Scene: {}", scene.name);
    println!("Film: {} x {}", scene.width, scene.height);
    println!("Vertices: {}", scene.vertex_count());
    println!("Triangles: {}", scene.triangle_count());
    println!("Lights: {}", scene.light_count());
    println!("Materials: {}", scene.material_count());
    println!("Media: {}", scene.media.len());
    println!("BVH nodes: {} (depth {})", prepared.node_count(), prepared.bvh.depth());

    println!("\nBuffers:");
    for (name, buffer) in prepared.buffers.buffers() {
        println!(
            "  {:<9} {:?} x {} texels, {} bytes",
            name,
            buffer.format,
            buffer.texel_count,
            buffer.bytes.len()
        );
    }
    println!("  total     {} bytes", prepared.buffers.total_bytes());

    Ok(())
}
