use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::rendering::asset_graph::disposer::{DisposableObject, ObjectDisposer};
use crate::rendering::asset_graph::global_texture_cache::GlobalTextureCache;
use crate::rendering::common::types::{RenderMaterial, RenderMesh, TextureHandle};

#[derive(Default)]
struct Tracked {
    meshes: Vec<Arc<RenderMesh>>,
    materials: Vec<Arc<RenderMaterial>>,
    owned_textures: Vec<TextureHandle>,
    /// One entry per reference this import holds in the global texture cache.
    shared_textures: Vec<TextureHandle>,
}

/// Everything renderable one import created or referenced. Every object instantiated from the import keeps a
/// clone, so the resources are released as a unit once the importer and all of those objects are gone.
pub struct RefCountedCacheData {
    tracked: Mutex<Tracked>,
    global_textures: Arc<GlobalTextureCache>,
    disposer: Arc<dyn ObjectDisposer>,
}

impl RefCountedCacheData {
    pub fn new(global_textures: Arc<GlobalTextureCache>, disposer: Arc<dyn ObjectDisposer>) -> Self {
        Self {
            tracked: Mutex::new(Tracked::default()),
            global_textures,
            disposer,
        }
    }

    pub fn add_mesh(&self, mesh: Arc<RenderMesh>) {
        self.tracked.lock().expect("Instantiation Lock").meshes.push(mesh);
    }

    pub fn add_material(&self, material: Arc<RenderMaterial>) {
        self.tracked.lock().expect("Instantiation Lock").materials.push(material);
    }

    pub fn add_owned_texture(&self, texture: TextureHandle) {
        self.tracked
            .lock()
            .expect("Instantiation Lock")
            .owned_textures
            .push(texture);
    }

    /// Takes over one global cache reference that has been acquired through `get` or `add`.
    pub fn add_shared_texture(&self, texture: TextureHandle) {
        self.tracked
            .lock()
            .expect("Instantiation Lock")
            .shared_textures
            .push(texture);
    }

    pub fn mesh_count(&self) -> usize {
        self.tracked.lock().expect("Instantiation Lock").meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.tracked.lock().expect("Instantiation Lock").materials.len()
    }

    pub fn texture_count(&self) -> usize {
        let tracked = self.tracked.lock().expect("Instantiation Lock");
        tracked.owned_textures.len() + tracked.shared_textures.len()
    }
}

impl Drop for RefCountedCacheData {
    fn drop(&mut self) {
        let tracked = std::mem::take(&mut *self.tracked.lock().expect("Instantiation Lock"));
        debug!(
            "Releasing {} meshes, {} materials, {} owned and {} shared textures",
            tracked.meshes.len(),
            tracked.materials.len(),
            tracked.owned_textures.len(),
            tracked.shared_textures.len()
        );

        for texture in tracked.shared_textures {
            self.global_textures.remove_ref(&texture);
        }

        for texture in tracked.owned_textures {
            self.disposer.dispose(DisposableObject::Texture(texture));
        }

        for mesh in tracked.meshes {
            self.disposer.dispose(DisposableObject::Mesh(mesh));
        }

        for material in tracked.materials {
            self.disposer.dispose(DisposableObject::Material(material));
        }
    }
}

impl Debug for RefCountedCacheData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tracked = self.tracked.lock().expect("Instantiation Lock");
        write!(
            f,
            "RefCountedCacheData {{ meshes: {}, materials: {}, textures: {} }}",
            tracked.meshes.len(),
            tracked.materials.len(),
            tracked.owned_textures.len() + tracked.shared_textures.len()
        )
    }
}

/// Component on the top level object of a loaded scene or node.
#[derive(Debug, Clone)]
pub struct InstantiatedGltfObject(pub Arc<RefCountedCacheData>);

impl InstantiatedGltfObject {
    pub fn cache_data(&self) -> &Arc<RefCountedCacheData> {
        &self.0
    }
}
