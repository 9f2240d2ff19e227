mod common;

use std::sync::Arc;

use glam::Vec3;
use gltfstream::error::{AssetKind, ImportError};
use gltfstream::io::common::loader::{LoadError, Stream, StreamProvider};
use gltfstream::io::memory::loader::MemoryLoader;
use gltfstream::rendering::asset_graph::global_texture_cache::GlobalTextureCache;
use gltfstream::rendering::asset_graph::scheduler::{CancelToken, FrameDriver};
use gltfstream::rendering::common::scene_graph::{SceneGraph, SceneObjectId};
use gltfstream::rendering::importer::material_importer::DEFAULT_MATERIAL_NAME;
use gltfstream::rendering::importer::scene_importer::{DEFAULT_SCENE_NAME, SceneImporter};
use gltfstream::rendering::importer::state::ImportState;
use gltfstream::settings::ImportOptions;
use serde_json::json;
use tokio::sync::Semaphore;

use common::{DocumentBuilder, TRIANGLE, importer, triangle_document};

fn triangle_loader() -> Arc<MemoryLoader> {
    let mut builder = DocumentBuilder::new();
    let document = triangle_document(&mut builder);
    let loader = Arc::new(MemoryLoader::new());
    loader.insert("triangle.gltf", builder.embedded(document));
    loader
}

/// Names and structure below `id`, for comparing two imports.
fn outline(graph: &SceneGraph, id: SceneObjectId) -> Vec<String> {
    graph
        .descendants(id)
        .into_iter()
        .filter_map(|id| graph.get(id))
        .map(|object| {
            let renderer = object
                .renderer
                .as_ref()
                .map(|r| format!("{}:{}:{}", r.mesh().name, r.mesh().vertex_count, r.material().name));
            format!("{}/{}/{:?}", object.name, object.children().len(), renderer)
        })
        .collect()
}

#[test_log::test(tokio::test)]
async fn one_triangle_gets_the_default_material_and_face_normals() {
    let importer = importer("triangle.gltf", triangle_loader());
    let root = importer.load_scene(None).await.unwrap();
    assert_eq!(importer.state(), ImportState::Complete);
    assert!(!importer.is_busy());

    let graph = importer.scene_graph().read().unwrap();
    let scene = graph.get(root).unwrap();
    assert_eq!(scene.name, DEFAULT_SCENE_NAME);
    assert!(scene.active);
    assert_eq!(scene.children().len(), 1);

    let node = graph.get(scene.children()[0]).unwrap();
    assert_eq!(node.name, "GLTFNode0");
    assert!(node.active);
    let renderer = node.renderer.as_ref().unwrap();
    let mesh = renderer.mesh();
    assert_eq!(mesh.vertex_count, 3);
    assert_eq!(mesh.triangle_count(), 1);
    assert_eq!(renderer.material().name, DEFAULT_MATERIAL_NAME);

    let normals = mesh.with_data(|data| data.vertex_buffers.normals.clone()).unwrap();
    // the source triangle faces +Z, mirroring X keeps it facing +Z
    for normal in normals {
        assert!(normal.abs_diff_eq(Vec3::Z, 1e-6), "{}", normal);
    }

    let record = scene.instantiated.as_ref().unwrap().cache_data();
    assert_eq!(record.mesh_count(), 1);
    assert_eq!(record.texture_count(), 0);
}

#[test_log::test(tokio::test)]
async fn missing_mesh_reports_a_range_error_through_the_callback() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.vec3s(&TRIANGLE);
    let document = json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 3 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
    });
    let loader = Arc::new(MemoryLoader::new());
    loader.insert("broken.gltf", builder.embedded(document));

    let importer = importer("broken.gltf", loader);
    let mut reported = None;
    importer
        .load_scene_with(None, |root, err| reported = Some((root, err)))
        .await;

    let (root, err) = reported.unwrap();
    assert_eq!(root, None);
    assert!(matches!(
        err,
        Some(ImportError::Range {
            kind: AssetKind::Mesh,
            index: 3,
            count: 1
        })
    ));
    assert_eq!(importer.state(), ImportState::Failed);
    // the busy flag is cleared, a retry gets to run (and fails the same way)
    assert!(!importer.is_busy());
    assert!(matches!(importer.load_scene(Some(0)).await, Err(ImportError::Range { .. })));
}

#[test_log::test(tokio::test)]
async fn an_unknown_scene_is_a_range_error() {
    let importer = importer("triangle.gltf", triangle_loader());
    let err = importer.load_scene(Some(4)).await.unwrap_err();
    assert!(matches!(err, ImportError::Range { kind: AssetKind::Scene, .. }));
}

/// Holds every load until the test opens the gate.
struct GatedLoader {
    inner: MemoryLoader,
    gate: Semaphore,
}

impl GatedLoader {
    fn open(&self) {
        self.gate.add_permits(1024);
    }
}

impl StreamProvider for GatedLoader {
    async fn load_stream(&self, path: &str) -> Result<Stream, LoadError> {
        // permits are never handed back, every load consumes one
        self.gate.acquire().await.expect("gate closed").forget();
        self.inner.load_stream(path).await
    }

    fn give_back(&self, stream: Stream) -> bool {
        self.inner.give_back(stream)
    }

    fn clear(&self) {
        self.inner.clear()
    }
}

#[test_log::test(tokio::test)]
async fn busy_importer_rejects_a_second_load() {
    let mut builder = DocumentBuilder::new();
    let document = triangle_document(&mut builder);
    let inner = MemoryLoader::new();
    inner.insert("triangle.gltf", builder.embedded(document));
    let loader = Arc::new(GatedLoader {
        inner,
        gate: Semaphore::new(0),
    });

    let importer = importer("triangle.gltf", loader.clone());
    let mut first = FrameDriver::new(importer.scheduler().clone(), importer.load_scene(None));
    assert!(first.tick().is_pending());
    assert!(importer.is_busy());

    let second = importer.load_scene(None).await;
    assert!(matches!(second, Err(ImportError::Concurrency)));
    assert!(matches!(importer.dispose(), Err(ImportError::Concurrency)));

    loader.open();
    let root = first.run(100).unwrap().unwrap();
    assert!(importer.scene_graph().read().unwrap().get(root).is_some());
    assert_eq!(importer.state(), ImportState::Complete);
}

#[test_log::test(tokio::test)]
async fn imports_are_deterministic() {
    let loader = triangle_loader();
    let first = importer("triangle.gltf", loader.clone());
    let second = importer("triangle.gltf", loader);
    let a = first.load_scene(None).await.unwrap();
    let b = second.load_scene(None).await.unwrap();

    let a = outline(&first.scene_graph().read().unwrap(), a);
    let b = outline(&second.scene_graph().read().unwrap(), b);
    assert_eq!(a, b);
    assert_eq!(a.len(), 2);
}

#[test_log::test(tokio::test)]
async fn shared_accessors_and_buffers_are_built_once() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.vec3s(&TRIANGLE);
    let primitive = json!({ "attributes": { "POSITION": positions } });
    let document = json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [{ "mesh": 0 }, { "mesh": 0 }],
        "meshes": [{ "name": "Pair", "primitives": [primitive.clone(), primitive] }],
    });
    let (gltf, bin) = builder.external(document, "pair.bin");
    let loader = Arc::new(MemoryLoader::new());
    loader.insert("models/pair.gltf", gltf);
    loader.insert("models/pair.bin", bin);

    let importer = importer("models/pair.gltf", loader.clone());
    let root = importer.load_scene(None).await.unwrap();

    let stats = importer.stats();
    assert_eq!(stats.builds(AssetKind::Buffer), 1);
    assert_eq!(stats.builds(AssetKind::Primitive), 2);
    assert_eq!(stats.builds(AssetKind::Node), 2);
    assert_eq!(loader.load_count("models/pair.bin"), 1);
    assert!(stats.stage_timings.iter().any(|(state, _)| *state == ImportState::BuildingMeshes));

    // both nodes share the renderables
    let graph = importer.scene_graph().read().unwrap();
    let nodes = graph.get(root).unwrap().children().to_vec();
    let meshes = nodes
        .iter()
        .map(|&node| {
            let primitives = graph.get(node).unwrap().children().to_vec();
            assert_eq!(primitives.len(), 2);
            let renderer = graph.get(primitives[1]).unwrap().renderer.clone().unwrap();
            assert_eq!(graph.get(primitives[1]).unwrap().name, "Primitive");
            renderer.mesh().clone()
        })
        .collect::<Vec<_>>();
    assert!(Arc::ptr_eq(&meshes[0], &meshes[1]));
    assert_eq!(meshes[0].name, "Pair_1");

    // the document's buffer has been recycled for pair.bin, which went back to the pool as well
    assert_eq!(loader.pooled_buffers(), 1);
}

#[test_log::test(tokio::test)]
async fn binary_containers_read_their_bin_chunk() {
    let mut builder = DocumentBuilder::new();
    let document = triangle_document(&mut builder);
    let loader = Arc::new(MemoryLoader::new());
    loader.insert("triangle.glb", builder.glb(document));

    let importer = importer("triangle.glb", loader);
    let root = importer.load_node(0).await.unwrap();

    let graph = importer.scene_graph().read().unwrap();
    let node = graph.get(root).unwrap();
    assert_eq!(node.name, "GLTFNode0");
    assert!(node.active);
    assert!(node.instantiated.is_some());
    assert_eq!(node.renderer.as_ref().unwrap().mesh().vertex_count, 3);
}

#[test_log::test(tokio::test)]
async fn a_cancelled_import_fails_at_the_next_suspension_point() {
    let cancel = CancelToken::new();
    let importer = importer("triangle.gltf", triangle_loader()).with_cancel_token(cancel.clone());
    cancel.cancel();

    let err = importer.load_scene(None).await.unwrap_err();
    assert!(matches!(err, ImportError::Cancelled));
    assert_eq!(importer.state(), ImportState::Failed);
}

#[test_log::test(tokio::test)]
async fn an_exhausted_budget_spreads_the_import_over_frames() {
    let options = ImportOptions {
        frame_budget_ms: 0,
        ..ImportOptions::default()
    };
    let importer = SceneImporter::new("triangle.gltf", triangle_loader(), options)
        .with_texture_cache(Arc::new(GlobalTextureCache::new()));

    let mut driver = FrameDriver::new(importer.scheduler().clone(), importer.load_scene(None));
    let mut result = None;
    for _ in 0..100 {
        if let std::task::Poll::Ready(done) = driver.tick() {
            result = Some(done);
            break;
        }
        // something else gets to run in between
        tokio::task::yield_now().await;
    }

    assert!(result.unwrap().is_ok());
    assert!(driver.ticks() > 1);
}

#[test_log::test(tokio::test)]
async fn hidden_scenes_stay_inactive() {
    let options = ImportOptions {
        show_scene_object: false,
        ..common::options()
    };
    let importer = SceneImporter::new("triangle.gltf", triangle_loader(), options)
        .with_texture_cache(Arc::new(GlobalTextureCache::new()));
    let root = importer.load_scene(None).await.unwrap();
    assert!(!importer.scene_graph().read().unwrap().get(root).unwrap().active);
}

#[test_log::test(tokio::test)]
async fn abandoned_loads_leave_the_importer_reusable() {
    let options = ImportOptions {
        frame_budget_ms: 0,
        ..ImportOptions::default()
    };
    let importer = SceneImporter::new("triangle.gltf", triangle_loader(), options)
        .with_texture_cache(Arc::new(GlobalTextureCache::new()));

    // give up after a growing number of frames, so every suspension point gets abandoned once
    for frames in 1..12 {
        let mut driver = FrameDriver::new(importer.scheduler().clone(), importer.load_scene(None));
        for _ in 0..frames {
            if driver.tick().is_ready() {
                break;
            }
        }
        drop(driver);
        assert!(!importer.is_busy());
    }

    let root = FrameDriver::new(importer.scheduler().clone(), importer.load_scene(None))
        .run(1000)
        .unwrap()
        .unwrap();
    assert_eq!(importer.state(), ImportState::Complete);

    let graph = importer.scene_graph().read().unwrap();
    let scene = graph.get(root).unwrap();
    let node = graph.get(scene.children()[0]).unwrap();
    assert_eq!(node.renderer.as_ref().unwrap().mesh().vertex_count, 3);
    assert_eq!(scene.instantiated.as_ref().unwrap().cache_data().mesh_count(), 1);
}

#[test_log::test(tokio::test)]
async fn sparse_positions_are_substituted() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.sparse_vec3s(3, &[1, 2], &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let document = json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
    });
    let loader = Arc::new(MemoryLoader::new());
    loader.insert("sparse.gltf", builder.embedded(document));

    let importer = importer("sparse.gltf", loader);
    let root = importer.load_scene(None).await.unwrap();

    let graph = importer.scene_graph().read().unwrap();
    let node = graph.get(graph.get(root).unwrap().children()[0]).unwrap();
    let mesh = node.renderer.as_ref().unwrap().mesh();
    let positions = mesh.with_data(|data| data.vertex_buffers.positions.clone()).unwrap();
    // X is mirrored on import
    assert_eq!(positions, vec![Vec3::ZERO, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)]);
}
