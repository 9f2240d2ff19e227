mod common;

use std::sync::Arc;

use base64::Engine;
use gltfstream::error::AssetKind;
use gltfstream::io::memory::loader::MemoryLoader;
use gltfstream::rendering::asset_graph::disposer::DeferredDisposer;
use gltfstream::rendering::asset_graph::global_texture_cache::GlobalTextureCache;
use gltfstream::rendering::common::types::{FilterMode, MaterialWorkflow, TextureHandle, WrapMode};
use gltfstream::rendering::importer::material_importer::METAL_ROUGHNESS_SHADER;
use gltfstream::settings::ImportOptions;
use gltfstream_files::gltf::types::AlphaMode;
use serde_json::{Value, json};

use common::{DocumentBuilder, TRIANGLE, importer, importer_with, options, png};

const SHARED_TEXTURE: &str = "textures/shared.png";

/// A triangle whose material samples `image`. The alpha mode is left to inference.
fn textured_document(builder: &mut DocumentBuilder, image: Value, with_colors: bool) -> Value {
    let positions = builder.vec3s(&TRIANGLE);
    let mut attributes = json!({ "POSITION": positions });
    if with_colors {
        attributes["COLOR_0"] = json!(builder.vec4s(&[[1.0, 0.0, 0.0, 1.0]; 3]));
    }

    json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Textured", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": attributes, "material": 0 }] }],
        "materials": [{
            "name": "Painted",
            "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 }, "metallicFactor": 0.25 },
            "emissiveFactor": [0.5, 0.0, 0.0],
            "doubleSided": true,
        }],
        "textures": [{ "source": 0, "sampler": 0 }],
        "samplers": [{ "magFilter": 9728, "wrapS": 33071, "wrapT": 33648 }],
        "images": [image],
    })
}

fn base_color_texture(workflow: &MaterialWorkflow) -> TextureHandle {
    match workflow {
        MaterialWorkflow::MetalRoughness {
            base_color_texture: Some(binding),
            ..
        } => binding.texture.image.clone(),
        other => panic!("no base color texture in {:?}", other),
    }
}

fn shared_texture_loader(documents: usize) -> Arc<MemoryLoader> {
    let loader = Arc::new(MemoryLoader::new());
    loader.insert(SHARED_TEXTURE, png(4, 4, [255, 255, 255, 255]));
    for i in 0..documents {
        let mut builder = DocumentBuilder::new();
        let document = textured_document(&mut builder, json!({ "uri": "../textures/shared.png" }), false);
        loader.insert(&format!("models/{}.gltf", i), builder.embedded(document));
    }
    loader
}

#[test_log::test(tokio::test)]
async fn concurrent_imports_decode_a_shared_path_once() {
    const IMPORTS: usize = 3;
    let loader = shared_texture_loader(IMPORTS);
    let textures = Arc::new(GlobalTextureCache::new());
    let importers = (0..IMPORTS)
        .map(|i| importer_with(&format!("models/{}.gltf", i), loader.clone(), options(), textures.clone()))
        .collect::<Vec<_>>();

    let (a, b, c) = tokio::join!(
        importers[0].load_scene(None),
        importers[1].load_scene(None),
        importers[2].load_scene(None)
    );
    let roots = [a.unwrap(), b.unwrap(), c.unwrap()];

    let decodes: usize = importers.iter().map(|importer| importer.stats().decodes).sum();
    assert_eq!(decodes, 1);
    assert_eq!(textures.reference_count(SHARED_TEXTURE), IMPORTS);

    let handles = importers
        .iter()
        .zip(roots)
        .map(|(importer, root)| {
            let graph = importer.scene_graph().read().unwrap();
            let node = graph.get(root).unwrap().children()[0];
            let material = graph.get(node).unwrap().renderer.as_ref().unwrap().material().clone();
            base_color_texture(&material.workflow)
        })
        .collect::<Vec<_>>();
    assert!(handles.iter().all(|handle| Arc::ptr_eq(handle, &handles[0])));

    // released only once the last instantiated scene is gone
    for (i, (importer, root)) in importers.iter().zip(roots).enumerate() {
        assert!(!handles[0].is_destroyed());
        importer.scene_graph().write().unwrap().destroy(root);
        assert_eq!(textures.reference_count(SHARED_TEXTURE), IMPORTS - i - 1);
    }
    assert!(handles[0].is_destroyed());
    assert!(!textures.contains(SHARED_TEXTURE));
}

#[test_log::test(tokio::test)]
async fn textured_materials_carry_their_inputs() {
    let mut builder = DocumentBuilder::new();
    let view = builder.view(&png(4, 4, [0, 128, 255, 255]));
    let document = textured_document(&mut builder, json!({ "bufferView": view, "mimeType": "image/png" }), true);
    let loader = Arc::new(MemoryLoader::new());
    loader.insert("painted.gltf", builder.embedded(document));

    let textures = Arc::new(GlobalTextureCache::new());
    let importer = importer_with("painted.gltf", loader, options(), textures.clone());
    let root = importer.load_scene(None).await.unwrap();

    let graph = importer.scene_graph().read().unwrap();
    let node = graph.get(graph.get(root).unwrap().children()[0]).unwrap();
    let material = node.renderer.as_ref().unwrap().material().clone();

    assert_eq!(material.name, "Painted");
    // PNG base color and no alpha mode of its own
    assert_eq!(material.alpha_mode, AlphaMode::Mask);
    assert_eq!(material.alpha_cutoff, 0.5);
    assert!(material.double_sided);
    assert!(material.vertex_colors);
    assert_eq!(material.emissive_factor.x, 0.5);
    assert_eq!(material.shader, METAL_ROUGHNESS_SHADER);

    let MaterialWorkflow::MetalRoughness {
        base_color_texture: Some(binding),
        metallic_factor,
        ..
    } = &material.workflow
    else {
        panic!("expected the metal roughness workflow");
    };
    assert_eq!(*metallic_factor, 0.25);
    assert_eq!(binding.texture.sampler.filter, FilterMode::Point);
    assert_eq!(binding.texture.sampler.wrap_u, WrapMode::Clamp);
    assert_eq!(binding.texture.sampler.wrap_v, WrapMode::Mirror);
    assert!(!binding.texture.image.is_linear());

    // embedded images are owned by the import, not shared
    assert!(textures.is_empty());
    let record = graph.get(root).unwrap().instantiated.as_ref().unwrap().cache_data();
    assert_eq!(record.texture_count(), 1);
    assert_eq!(importer.stats().decodes, 1);
    assert_eq!(importer.stats().builds(AssetKind::Material), 1);
}

#[test_log::test(tokio::test)]
async fn data_uri_images_and_missing_files() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(png(4, 4, [10, 20, 30, 255]));
    let mut builder = DocumentBuilder::new();
    let mut document = textured_document(
        &mut builder,
        json!({ "uri": format!("data:image/png;base64,{}", encoded) }),
        false,
    );
    document["images"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "uri": "nowhere.png" }));
    document["textures"].as_array_mut().unwrap().push(json!({ "source": 1 }));
    document["materials"][0]["normalTexture"] = json!({ "index": 1, "scale": 0.5 });

    let loader = Arc::new(MemoryLoader::new());
    loader.insert("mixed.gltf", builder.embedded(document));
    let importer = importer("mixed.gltf", loader);
    let root = importer.load_scene(None).await.unwrap();

    let graph = importer.scene_graph().read().unwrap();
    let node = graph.get(graph.get(root).unwrap().children()[0]).unwrap();
    let material = node.renderer.as_ref().unwrap().material();
    assert!(material.normal_texture.is_none());
    assert_eq!(material.normal_scale, 0.5);
    assert_eq!(base_color_texture(&material.workflow).width(), 4);
}

#[test_log::test(tokio::test)]
async fn loaded_materials_stay_with_the_importer_until_disposed() {
    let loader = shared_texture_loader(1);
    let textures = Arc::new(GlobalTextureCache::new());
    let disposer = Arc::new(DeferredDisposer::new());
    let options = ImportOptions {
        multithreaded: true,
        ..options()
    };
    let importer = importer_with("models/0.gltf", loader.clone(), options, textures.clone())
        .with_disposer(disposer.clone());

    let material = importer.load_material(0).await.unwrap();
    assert_eq!(material.name, "Painted");
    assert_eq!(textures.reference_count(SHARED_TEXTURE), 1);
    // a second request is served from the session
    let again = importer.load_material(0).await.unwrap();
    assert!(Arc::ptr_eq(&material, &again));
    assert_eq!(importer.stats().builds(AssetKind::Material), 1);

    assert!(importer.dispose().unwrap() > 0);
    assert!(!textures.contains(SHARED_TEXTURE));
    assert!(base_color_texture(&material.workflow).is_destroyed());
    // both material variants were queued
    assert_eq!(disposer.pending(), 2);
    assert_eq!(disposer.flush(), 2);
    assert!(material.is_destroyed());
    assert!(loader.pooled_buffers() > 0);
}

#[test_log::test(tokio::test)]
async fn one_image_in_both_color_spaces_keeps_the_first() {
    let mut builder = DocumentBuilder::new();
    let view = builder.view(&png(4, 4, [0, 128, 255, 255]));
    let mut document = textured_document(&mut builder, json!({ "bufferView": view, "mimeType": "image/png" }), false);
    document["materials"][0]["normalTexture"] = json!({ "index": 0 });
    document["materials"].as_array_mut().unwrap().push(json!({
        "name": "Bumpy",
        "occlusionTexture": { "index": 0 },
    }));

    let loader = Arc::new(MemoryLoader::new());
    loader.insert("bumpy.gltf", builder.embedded(document));
    let importer = importer("bumpy.gltf", loader);
    let painted = importer.load_material(0).await.unwrap();
    let bumpy = importer.load_material(1).await.unwrap();

    let base_color = base_color_texture(&painted.workflow);
    assert!(!base_color.is_linear());
    let normal = painted.normal_texture.as_ref().unwrap();
    assert!(Arc::ptr_eq(&normal.texture.image, &base_color));
    assert!(Arc::ptr_eq(&bumpy.occlusion_texture.as_ref().unwrap().texture.image, &base_color));

    let stats = importer.stats();
    assert_eq!(stats.decodes, 1);
    assert_eq!(stats.color_space_conflicts, 2);
}
