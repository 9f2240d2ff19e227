use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use glam::{Vec2, Vec3, Vec4};
use gltfstream_files::common::types::{DecodedImage, TextureFormat};
use gltfstream_files::gltf::extensions::TextureTransform;
use gltfstream_files::gltf::types::AlphaMode;

/// Set once an engine object has been destroyed. Cloning an object yields a fresh, alive flag.
#[derive(Default)]
pub struct DestroyFlag(AtomicBool);

impl DestroyFlag {
    /// Returns true only for the call that actually destroyed the object.
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Clone for DestroyFlag {
    fn clone(&self) -> Self {
        DestroyFlag::default()
    }
}

impl Debug for DestroyFlag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", if self.is_raised() { "destroyed" } else { "alive" })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

impl TextureId {
    fn next() -> Self {
        TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A decoded, renderer-ready image. The CPU side copy is only retained when requested.
pub struct Texture {
    id: TextureId,
    label: String,
    width: u32,
    height: u32,
    mip_count: u32,
    format: TextureFormat,
    linear: bool,
    byte_size: usize,
    data: RwLock<Option<Vec<u8>>>,
    destroyed: DestroyFlag,
}

pub type TextureHandle = Arc<Texture>;

impl Texture {
    pub fn new(label: impl Into<String>, image: DecodedImage, linear: bool, keep_cpu_copy: bool) -> Self {
        Self {
            id: TextureId::next(),
            label: label.into(),
            width: image.width,
            height: image.height,
            mip_count: image.mip_count,
            format: image.format,
            linear,
            byte_size: image.data.len(),
            data: RwLock::new(keep_cpu_copy.then_some(image.data)),
            destroyed: DestroyFlag::default(),
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn is_linear(&self) -> bool {
        self.linear
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn has_cpu_copy(&self) -> bool {
        self.data.read().expect("Texture Data Lock").is_some()
    }

    pub fn with_cpu_copy<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.data.read().expect("Texture Data Lock").as_deref().map(f)
    }

    pub fn destroy(&self) -> bool {
        let first = self.destroyed.raise();
        if first {
            self.data.write().expect("Texture Data Lock").take();
        }
        first
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_raised()
    }
}

impl Debug for Texture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Texture {{ id: {:?}, label: {}, {}x{}, mips: {}, format: {:?}, linear: {}, {:?} }}",
            self.id, self.label, self.width, self.height, self.mip_count, self.format, self.linear, self.destroyed
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterMode {
    Point,
    Bilinear,
    Trilinear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WrapMode {
    Clamp,
    Repeat,
    Mirror,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SamplerState {
    pub filter: FilterMode,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            filter: FilterMode::Trilinear,
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
        }
    }
}

/// An image plus the sampler state a document texture samples it with.
#[derive(Debug, Clone)]
pub struct RenderTexture {
    pub image: TextureHandle,
    pub sampler: SamplerState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    pub const U16_VERTEX_LIMIT: usize = 65535;

    /// Picks the smallest representation that can address `vertex_count` vertices.
    pub fn for_vertex_count(indices: Vec<u32>, vertex_count: usize) -> Self {
        if vertex_count > IndexBuffer::U16_VERTEX_LIMIT {
            IndexBuffer::U32(indices)
        } else {
            IndexBuffer::U16(indices.into_iter().map(|i| i as u16).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(indices) => indices.len(),
            IndexBuffer::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            IndexBuffer::U16(indices) => indices.get(index).map(|&i| i as u32),
            IndexBuffer::U32(indices) => indices.get(index).copied(),
        }
    }

    pub fn to_u32(&self) -> Vec<u32> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}

#[derive(Clone, Default)]
pub struct VertexBuffers {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub tex_coords: [Vec<Vec2>; 4],
    pub colors: Vec<Vec4>,
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<Vec4>,
}

impl Debug for VertexBuffers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ positions: [{}], ", self.positions.len())?;
        write!(f, "normals: [{}], ", self.normals.len())?;
        write!(f, "tangents: [{}], ", self.tangents.len())?;
        for (i, uv) in self.tex_coords.iter().enumerate() {
            write!(f, "tex_coord_{}: [{}], ", i, uv.len())?;
        }
        write!(f, "colors: [{}], ", self.colors.len())?;
        write!(f, "joints: [{}], ", self.joints.len())?;
        write!(f, "weights: [{}] }}", self.weights.len())
    }
}

#[derive(Clone, Debug)]
pub struct MeshData {
    pub vertex_buffers: VertexBuffers,
    pub index_buffer: IndexBuffer,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Aabb {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        }

        points.iter().fold(
            Aabb {
                min: Vec3::splat(f32::MAX),
                max: Vec3::splat(f32::MIN),
            },
            |aabb, &p| Aabb {
                min: aabb.min.min(p),
                max: aabb.max.max(p),
            },
        )
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// A renderable mesh. The vertex data is dropped after upload unless a CPU copy has been requested.
pub struct RenderMesh {
    pub name: String,
    pub vertex_count: usize,
    pub index_count: usize,
    pub bounds: Aabb,
    pub uses_32bit_indices: bool,
    data: RwLock<Option<MeshData>>,
    destroyed: DestroyFlag,
}

impl RenderMesh {
    pub fn new(name: impl Into<String>, data: MeshData, keep_cpu_copy: bool) -> Self {
        Self {
            name: name.into(),
            vertex_count: data.vertex_buffers.positions.len(),
            index_count: data.index_buffer.len(),
            bounds: Aabb::from_points(&data.vertex_buffers.positions),
            uses_32bit_indices: matches!(data.index_buffer, IndexBuffer::U32(_)),
            data: RwLock::new(keep_cpu_copy.then_some(data)),
            destroyed: DestroyFlag::default(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.index_count / 3
    }

    pub fn with_data<R>(&self, f: impl FnOnce(&MeshData) -> R) -> Option<R> {
        self.data.read().expect("Mesh Data Lock").as_ref().map(f)
    }

    pub fn destroy(&self) -> bool {
        let first = self.destroyed.raise();
        if first {
            self.data.write().expect("Mesh Data Lock").take();
        }
        first
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_raised()
    }
}

impl Debug for RenderMesh {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RenderMesh {{ name: {}, vertices: {}, indices: {}, 32bit: {}, {:?} }}",
            self.name, self.vertex_count, self.index_count, self.uses_32bit_indices, self.destroyed
        )
    }
}

#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub texture: RenderTexture,
    pub tex_coord: u32,
    pub transform: Option<TextureTransform>,
}

#[derive(Debug, Clone)]
pub enum MaterialWorkflow {
    MetalRoughness {
        base_color_factor: Vec4,
        base_color_texture: Option<TextureBinding>,
        metallic_factor: f32,
        roughness_factor: f32,
        metallic_roughness_texture: Option<TextureBinding>,
    },
    SpecularGlossiness {
        diffuse_factor: Vec4,
        diffuse_texture: Option<TextureBinding>,
        specular_factor: Vec3,
        glossiness_factor: f32,
        specular_glossiness_texture: Option<TextureBinding>,
    },
}

impl MaterialWorkflow {
    /// The bindings of this workflow, in the order they are declared.
    pub fn texture_bindings(&self) -> Vec<&TextureBinding> {
        match self {
            MaterialWorkflow::MetalRoughness {
                base_color_texture,
                metallic_roughness_texture,
                ..
            } => [base_color_texture, metallic_roughness_texture],
            MaterialWorkflow::SpecularGlossiness {
                diffuse_texture,
                specular_glossiness_texture,
                ..
            } => [diffuse_texture, specular_glossiness_texture],
        }
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RenderMaterial {
    pub name: String,
    pub shader: String,
    pub workflow: MaterialWorkflow,
    pub normal_texture: Option<TextureBinding>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureBinding>,
    pub occlusion_strength: f32,
    pub emissive_texture: Option<TextureBinding>,
    pub emissive_factor: Vec3,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub unlit: bool,
    pub vertex_colors: bool,
    pub maximum_lod: u32,
    pub destroyed: DestroyFlag,
}

impl RenderMaterial {
    pub fn with_vertex_colors(&self) -> RenderMaterial {
        RenderMaterial {
            vertex_colors: true,
            ..self.clone()
        }
    }

    pub fn texture_bindings(&self) -> Vec<&TextureBinding> {
        let mut bindings = self.workflow.texture_bindings();
        bindings.extend(
            [&self.normal_texture, &self.occlusion_texture, &self.emissive_texture]
                .into_iter()
                .flatten(),
        );
        bindings
    }

    pub fn destroy(&self) -> bool {
        self.destroyed.raise()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_raised()
    }
}
