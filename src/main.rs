use std::collections::HashMap;
use std::fs;

use anyhow::Context;
use clap::Parser;

mod args;
mod error;
mod export;
mod extended_mesh;
mod material;
mod rcp;
mod render_chunk;
mod scene;
mod settings;

use args::Args;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut materials = HashMap::new();
    for path in &args.materials {
        let file = material::load_material_file(path)
            .with_context(|| format!("loading materials from {}", path.display()))?;
        log::info!("loaded {} materials from {}", file.len(), path.display());
        materials.extend(file);
    }
    let settings = args.settings(materials);

    let mut scenes = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let scene = scene::load_scene(path)
            .with_context(|| format!("loading scene {}", path.display()))?;
        log::info!(
            "loaded {}: {} nodes, {} meshes",
            path.display(),
            scene.nodes.len(),
            scene.meshes.len()
        );
        scenes.push(scene);
    }

    let output = export::export_scenes(&scenes, &settings).context("generating display lists")?;

    fs::write(&args.output, &output.source)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("wrote {}", args.output.display());
    if let Some(header_path) = args.header_path() {
        fs::write(&header_path, &output.header)
            .with_context(|| format!("writing {}", header_path.display()))?;
        log::info!("wrote {}", header_path.display());
    }
    Ok(())
}
