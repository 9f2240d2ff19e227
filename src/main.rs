use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use log::info;

use gltfstream::io::common::timeout::TimeoutLoader;
use gltfstream::io::fs::loader::FileLoader;
use gltfstream::rendering::common::scene_graph::{SceneGraph, SceneObjectId};
use gltfstream::rendering::importer::scene_importer::SceneImporter;
use gltfstream::settings::CliArgs;

/// How often the frame clock re-arms the budget when there is no render loop around.
const FRAME_PERIOD: Duration = Duration::from_millis(16);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);
    let options = args.import_options()?;

    let root_directory = args.path.parent().unwrap_or(Path::new("")).to_path_buf();
    let file_name = args
        .path
        .file_name()
        .ok_or_else(|| anyhow!("{} is not a file", args.path.display()))?
        .to_string_lossy()
        .to_string();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Building the tokio runtime")?;

    // the import future stays on this thread, only the decoding is handed to the blocking pool
    runtime.block_on(async {
        let provider = Arc::new(TimeoutLoader::new(
            FileLoader::new(root_directory),
            options.stream_timeout(),
        ));
        let importer = SceneImporter::new(file_name, provider, options);
        let clock = importer.scheduler().spawn_frame_clock(FRAME_PERIOD);

        let root = importer.load_scene(args.scene).await?;
        clock.abort();

        let stats = importer.stats();
        info!(
            "Import took {} frames, {} images decoded",
            importer.scheduler().frame(),
            stats.decodes
        );
        for (state, time) in &stats.stage_timings {
            info!("{:?}: {:?}", state, time);
        }

        let graph = importer
            .scene_graph()
            .read()
            .map_err(|_| anyhow!("Scene Graph Read Lock poisoned"))?;
        print_hierarchy(&graph, root, 0);
        if let Some(record) = graph.get(root).and_then(|object| object.instantiated.as_ref()) {
            let record = record.cache_data();
            println!(
                "{} meshes, {} materials, {} textures",
                record.mesh_count(),
                record.material_count(),
                record.texture_count()
            );
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn print_hierarchy(graph: &SceneGraph, id: SceneObjectId, depth: usize) {
    let Some(object) = graph.get(id) else {
        return;
    };

    let mut line = format!("{}{}", "  ".repeat(depth), object.name);
    if let Some(renderer) = &object.renderer {
        let mesh = renderer.mesh();
        line += &format!(
            " [{}: {} vertices, {} triangles, {}]",
            mesh.name,
            mesh.vertex_count,
            mesh.triangle_count(),
            renderer.material().name
        );
    }
    if let Some(lod) = &object.lod_group {
        line += &format!(" [{} LOD levels]", lod.levels.len());
    }
    if let Some(animation) = &object.animation {
        line += &format!(" [{} clips]", animation.clips.len());
    }
    println!("{}", line);

    for &child in object.children() {
        print_hierarchy(graph, child, depth + 1);
    }
}
