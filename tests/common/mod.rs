#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use glam::Mat4;
use gltfstream::io::common::loader::StreamProvider;
use gltfstream::rendering::asset_graph::global_texture_cache::GlobalTextureCache;
use gltfstream::rendering::importer::scene_importer::SceneImporter;
use gltfstream::settings::ImportOptions;
use serde_json::{Value, json};

pub const FLOAT: u32 = 5126;
pub const UNSIGNED_SHORT: u32 = 5123;

pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// Collects the binary payload of a synthetic document, one buffer view per accessor.
#[derive(Default)]
pub struct DocumentBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        }));
        self.bin.extend_from_slice(bytes);
        self.views.len() - 1
    }

    fn accessor(&mut self, bytes: &[u8], component_type: u32, count: usize, accessor_type: &str) -> usize {
        let view = self.view(bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": component_type,
            "count": count,
            "type": accessor_type,
        }));
        self.accessors.len() - 1
    }

    pub fn floats(&mut self, values: &[f32]) -> usize {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        self.accessor(&bytes, FLOAT, values.len(), "SCALAR")
    }

    pub fn vec3s(&mut self, values: &[[f32; 3]]) -> usize {
        let bytes = values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        self.accessor(&bytes, FLOAT, values.len(), "VEC3")
    }

    pub fn vec4s(&mut self, values: &[[f32; 4]]) -> usize {
        let bytes = values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        self.accessor(&bytes, FLOAT, values.len(), "VEC4")
    }

    pub fn joints(&mut self, values: &[[u16; 4]]) -> usize {
        let bytes = values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        self.accessor(&bytes, UNSIGNED_SHORT, values.len(), "VEC4")
    }

    pub fn mat4s(&mut self, values: &[Mat4]) -> usize {
        let bytes = values
            .iter()
            .flat_map(|m| m.to_cols_array())
            .flat_map(|v| v.to_le_bytes())
            .collect::<Vec<_>>();
        self.accessor(&bytes, FLOAT, values.len(), "MAT4")
    }

    /// A VEC3 accessor without a base view: zeros, with `values` substituted at `indices`.
    pub fn sparse_vec3s(&mut self, count: usize, indices: &[u16], values: &[[f32; 3]]) -> usize {
        let index_bytes = indices.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        let value_bytes = values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        let index_view = self.view(&index_bytes);
        let value_view = self.view(&value_bytes);
        self.accessors.push(json!({
            "componentType": FLOAT,
            "count": count,
            "type": "VEC3",
            "sparse": {
                "count": indices.len(),
                "indices": { "bufferView": index_view, "componentType": UNSIGNED_SHORT },
                "values": { "bufferView": value_view },
            },
        }));
        self.accessors.len() - 1
    }

    pub fn indices(&mut self, values: &[u16]) -> usize {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        self.accessor(&bytes, UNSIGNED_SHORT, values.len(), "SCALAR")
    }

    fn complete(self, mut document: Value, buffer: Value) -> (Value, Vec<u8>) {
        document["asset"] = json!({ "version": "2.0" });
        document["bufferViews"] = Value::Array(self.views);
        document["accessors"] = Value::Array(self.accessors);
        document["buffers"] = json!([buffer]);
        (document, self.bin)
    }

    /// A `.gltf` with the buffer embedded as a data uri.
    pub fn embedded(self, document: Value) -> Vec<u8> {
        let uri = format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.bin)
        );
        let length = self.bin.len();
        let (document, _) = self.complete(document, json!({ "uri": uri, "byteLength": length }));
        serde_json::to_vec(&document).expect("json")
    }

    /// A `.gltf` plus the external buffer it refers to by `uri`.
    pub fn external(self, document: Value, uri: &str) -> (Vec<u8>, Vec<u8>) {
        let length = self.bin.len();
        let (document, bin) = self.complete(document, json!({ "uri": uri, "byteLength": length }));
        (serde_json::to_vec(&document).expect("json"), bin)
    }

    /// A `.glb` container carrying the buffer as its BIN chunk.
    pub fn glb(self, document: Value) -> Vec<u8> {
        let length = self.bin.len();
        let (document, mut bin) = self.complete(document, json!({ "byteLength": length }));

        let mut json = serde_json::to_vec(&document).expect("json");
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut glb = vec![];
        glb.extend(0x46546C67u32.to_le_bytes());
        glb.extend(2u32.to_le_bytes());
        glb.extend((total as u32).to_le_bytes());
        glb.extend((json.len() as u32).to_le_bytes());
        glb.extend(0x4E4F534Au32.to_le_bytes());
        glb.extend(json);
        glb.extend((bin.len() as u32).to_le_bytes());
        glb.extend(0x004E4942u32.to_le_bytes());
        glb.extend(bin);
        glb
    }
}

/// One triangle, one node, nothing else.
pub fn triangle_document(builder: &mut DocumentBuilder) -> Value {
    let positions = builder.vec3s(&TRIANGLE);
    let indices = builder.indices(&[0, 1, 2]);
    json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions }, "indices": indices }] }],
    })
}

pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Cursor::new(vec![]);
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png");
    bytes.into_inner()
}

/// Large enough that nothing yields unless a test asks for it.
pub fn options() -> ImportOptions {
    ImportOptions {
        frame_budget_ms: 60_000,
        ..ImportOptions::default()
    }
}

/// An importer with its own texture cache, so that tests running in parallel do not share textures.
pub fn importer<L: StreamProvider>(path: &str, provider: Arc<L>) -> SceneImporter<L> {
    importer_with(path, provider, options(), Arc::new(GlobalTextureCache::new()))
}

pub fn importer_with<L: StreamProvider>(
    path: &str,
    provider: Arc<L>,
    options: ImportOptions,
    textures: Arc<GlobalTextureCache>,
) -> SceneImporter<L> {
    SceneImporter::new(path, provider, options).with_texture_cache(textures)
}
