use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use gltfstream_files::gltf::types::{Material, Texture};

use crate::error::ImportError;
use crate::io::common::loader::Stream;
use crate::rendering::asset_graph::asset_cache::Slot;
use crate::rendering::common::animation::AnimationClip;
use crate::rendering::common::scene_graph::SceneObjectId;
use crate::rendering::common::types::{RenderMaterial, RenderMesh, RenderTexture, TextureHandle};
use crate::rendering::importer::accessor::AttributeAccessor;

/// Key of the index accessor inside [`MeshCacheData::attributes`].
pub const INDICES_ATTRIBUTE: &str = "INDICES";

/// A logical document buffer. Binary containers share one physical stream between the BIN chunk and the
/// document, so the buffer is a window into it.
#[derive(Debug)]
pub struct BufferCacheData {
    pub stream: Arc<Stream>,
    pub chunk_offset: usize,
    pub byte_length: usize,
}

impl BufferCacheData {
    pub fn new(stream: Arc<Stream>, chunk_offset: usize, byte_length: usize) -> Result<Self, ImportError> {
        let end = chunk_offset
            .checked_add(byte_length)
            .ok_or_else(|| ImportError::malformed("buffer window overflows"))?;
        if end > stream.len() {
            return Err(ImportError::malformed(format!(
                "buffer declares {} bytes at offset {}, but the stream only has {}",
                byte_length,
                chunk_offset,
                stream.len()
            )));
        }

        Ok(Self {
            stream,
            chunk_offset,
            byte_length,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.stream[self.chunk_offset..self.chunk_offset + self.byte_length]
    }
}

/// The raw payload of a document image, fetched ahead of decoding.
#[derive(Debug)]
pub enum ImageStream {
    Bytes(Stream),
    /// Another import already decoded the same path, we hold a reference in the global texture cache.
    Cached(TextureHandle),
    /// Loading failed, the texture stays empty.
    Missing,
}

#[derive(Debug)]
pub struct ImageCacheData {
    /// None if neither the specialized nor the generic decoder could make sense of the payload.
    pub texture: Option<TextureHandle>,
    /// The global texture cache key, if the handle is shared with other imports.
    pub shared_key: Option<String>,
}

impl ImageCacheData {
    pub fn is_shared(&self) -> bool {
        self.shared_key.is_some()
    }
}

#[derive(Debug)]
pub struct TextureCacheData {
    definition: Mutex<Option<Texture>>,
    pub texture: Option<RenderTexture>,
    /// Only owned handles are destroyed by us, shared ones are released through the global cache.
    pub auto_destroy: bool,
}

impl TextureCacheData {
    pub fn new(definition: Texture, texture: Option<RenderTexture>, auto_destroy: bool) -> Self {
        Self {
            definition: Mutex::new(Some(definition)),
            texture,
            auto_destroy,
        }
    }

    pub fn definition(&self) -> Option<Texture> {
        self.definition.lock().expect("Texture Definition Lock").clone()
    }

    pub fn clear_definition(&self) {
        self.definition.lock().expect("Texture Definition Lock").take();
    }
}

#[derive(Debug)]
pub struct MaterialCacheData {
    definition: Mutex<Option<Material>>,
    pub material: Arc<RenderMaterial>,
    pub material_with_vertex_color: Arc<RenderMaterial>,
}

impl MaterialCacheData {
    pub fn new(definition: Option<Material>, material: RenderMaterial) -> Self {
        let material_with_vertex_color = Arc::new(material.with_vertex_colors());
        Self {
            definition: Mutex::new(definition),
            material: Arc::new(material),
            material_with_vertex_color,
        }
    }

    pub fn variant(&self, vertex_colors: bool) -> &Arc<RenderMaterial> {
        if vertex_colors {
            &self.material_with_vertex_color
        } else {
            &self.material
        }
    }

    pub fn definition(&self) -> Option<Material> {
        self.definition.lock().expect("Material Definition Lock").clone()
    }

    pub fn clear_definition(&self) {
        self.definition.lock().expect("Material Definition Lock").take();
    }
}

/// One primitive. The accessors are populated first, the renderable mesh once every buffer is there.
pub struct MeshCacheData {
    pub attributes: Mutex<HashMap<String, AttributeAccessor>>,
    pub morph_target_count: usize,
    pub loaded_mesh: Slot<RenderMesh>,
}

impl MeshCacheData {
    pub fn new(attributes: HashMap<String, AttributeAccessor>, morph_target_count: usize) -> Self {
        Self {
            attributes: Mutex::new(attributes),
            morph_target_count,
            loaded_mesh: Slot::new(),
        }
    }

    /// A copy of the accessor map. The map itself stays in place until the mesh is published, so an
    /// abandoned build can be retried from the same slot.
    pub fn attributes_snapshot(&self) -> HashMap<String, AttributeAccessor> {
        self.attributes.lock().expect("Mesh Attributes Lock").clone()
    }

    pub fn clear_attributes(&self) {
        self.attributes.lock().expect("Mesh Attributes Lock").clear();
    }

    pub fn has_attributes(&self) -> bool {
        !self.attributes.lock().expect("Mesh Attributes Lock").is_empty()
    }
}

#[derive(Debug)]
pub struct NodeCacheData {
    /// The object carrying the node's own transform and renderers. Joints always point here.
    pub object: SceneObjectId,
    lod_group: OnceLock<SceneObjectId>,
}

impl NodeCacheData {
    pub fn new(object: SceneObjectId) -> Self {
        Self {
            object,
            lod_group: OnceLock::new(),
        }
    }

    pub fn set_lod_group(&self, group: SceneObjectId) {
        let _ = self.lod_group.set(group);
    }

    pub fn lod_group(&self) -> Option<SceneObjectId> {
        self.lod_group.get().copied()
    }

    /// What parents attach: the LOD group wrapping the node if there is one, else the node itself.
    pub fn attach_point(&self) -> SceneObjectId {
        self.lod_group().unwrap_or(self.object)
    }
}

#[derive(Debug)]
pub struct AnimationCacheData {
    pub clip: Arc<AnimationClip>,
}
