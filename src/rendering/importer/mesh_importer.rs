use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec4;
use gltfstream_files::gltf::types::{PRIMITIVE_MODE_TRIANGLES, Primitive};
use itertools::Itertools;
use log::{trace, warn};

use crate::error::{AssetKind, ImportError, check_range};
use crate::io::common::loader::StreamProvider;
use crate::rendering::asset_graph::cache_data::{INDICES_ATTRIBUTE, MeshCacheData};
use crate::rendering::common::coordinate_systems::{
    compute_normals, convert_tangent_slice, convert_vec3_slice, flip_tex_coord_slice, flip_winding,
};
use crate::rendering::common::scene_graph::{Collider, ColliderShape};
use crate::rendering::common::types::{IndexBuffer, MeshData, RenderMesh, VertexBuffers};
use crate::rendering::importer::accessor::AttributeAccessor;
use crate::rendering::importer::context::ImportContext;
use crate::settings::{ColliderMode, ImportOptions};

pub struct MeshImporter {}

impl MeshImporter {
    /// (semantic, accessor) pairs of everything a primitive reads, the index accessor under
    /// [`INDICES_ATTRIBUTE`].
    pub fn primitive_accessors(primitive: &Primitive) -> Vec<(String, usize)> {
        primitive
            .attributes
            .iter()
            .map(|(semantic, &accessor)| (semantic.clone(), accessor))
            .chain(primitive.indices.map(|indices| (INDICES_ATTRIBUTE.to_string(), indices)))
            .collect_vec()
    }

    pub fn mesh_name(name: Option<&str>, mesh: usize, primitive: usize, primitive_count: usize) -> String {
        let base = name.map(str::to_string).unwrap_or_else(|| format!("GLTFMesh{}", mesh));
        if primitive_count > 1 {
            format!("{}_{}", base, primitive)
        } else {
            base
        }
    }

    fn expect_count<T>(values: Vec<T>, semantic: &str, vertex_count: usize) -> Result<Vec<T>, ImportError> {
        if values.len() != vertex_count {
            return Err(ImportError::malformed(format!(
                "{} has {} elements, POSITION has {}",
                semantic,
                values.len(),
                vertex_count
            )));
        }
        Ok(values)
    }

    /// Decodes the accessors of one primitive into converted vertex streams. Pure, so it may run on a worker
    /// thread.
    pub fn build_mesh_data(attributes: &HashMap<String, AttributeAccessor>) -> Result<MeshData, ImportError> {
        profiling::scope!("MeshImporter::build_mesh_data");

        let positions = attributes
            .get("POSITION")
            .ok_or_else(|| ImportError::malformed("primitive has no POSITION attribute"))?
            .to_vec3s()?;
        let vertex_count = positions.len();
        let read = |semantic: &str| attributes.get(semantic);

        let mut buffers = VertexBuffers {
            positions,
            ..VertexBuffers::default()
        };
        convert_vec3_slice(&mut buffers.positions);

        if let Some(normals) = read("NORMAL") {
            buffers.normals = MeshImporter::expect_count(normals.to_vec3s()?, "NORMAL", vertex_count)?;
            convert_vec3_slice(&mut buffers.normals);
        }

        if let Some(tangents) = read("TANGENT") {
            buffers.tangents = MeshImporter::expect_count(tangents.to_vec4s()?, "TANGENT", vertex_count)?;
            convert_tangent_slice(&mut buffers.tangents);
        }

        for (set, tex_coords) in buffers.tex_coords.iter_mut().enumerate() {
            let semantic = format!("TEXCOORD_{}", set);
            if let Some(accessor) = read(&semantic) {
                *tex_coords = MeshImporter::expect_count(accessor.to_vec2s()?, &semantic, vertex_count)?;
                flip_tex_coord_slice(tex_coords);
            }
        }

        if let Some(colors) = read("COLOR_0") {
            buffers.colors = MeshImporter::expect_count(colors.to_colors()?, "COLOR_0", vertex_count)?;
        }

        if let Some(joints) = read("JOINTS_0") {
            buffers.joints = MeshImporter::expect_count(joints.to_joints()?, "JOINTS_0", vertex_count)?;
        }

        if let Some(weights) = read("WEIGHTS_0") {
            let mut weights = MeshImporter::expect_count(weights.to_vec4s()?, "WEIGHTS_0", vertex_count)?;
            MeshImporter::normalize_weights(&mut weights);
            buffers.weights = weights;
        }

        let mut indices = match read(INDICES_ATTRIBUTE) {
            Some(indices) => indices.to_indices()?,
            None => (0..vertex_count as u32).collect_vec(),
        };
        if indices.len() % 3 != 0 {
            return Err(ImportError::malformed(format!(
                "a triangle list has {} indices",
                indices.len()
            )));
        }
        if let Some(out_of_range) = indices.iter().find(|&&index| index as usize >= vertex_count) {
            return Err(ImportError::malformed(format!(
                "index {} is out of range for {} vertices",
                out_of_range, vertex_count
            )));
        }
        flip_winding(&mut indices);

        if buffers.normals.is_empty() {
            trace!("Recalculating normals for {} vertices", vertex_count);
            buffers.normals = compute_normals(&buffers.positions, &indices);
        }

        Ok(MeshData {
            vertex_buffers: buffers,
            index_buffer: IndexBuffer::for_vertex_count(indices, vertex_count),
        })
    }

    /// Scales every weight set to a sum of one. Sets that sum up to (almost) nothing are left alone.
    pub fn normalize_weights(weights: &mut [Vec4]) {
        for weight in weights {
            let sum = weight.x + weight.y + weight.z + weight.w;
            if sum > f32::EPSILON {
                *weight /= sum;
            }
        }
    }

    pub fn collider(mode: ColliderMode, mesh: &Arc<RenderMesh>, options: &ImportOptions) -> Option<Collider> {
        let shape = match mode {
            ColliderMode::None => return None,
            ColliderMode::Box => ColliderShape::Box {
                center: mesh.bounds.center(),
                size: mesh.bounds.size(),
            },
            ColliderMode::Mesh => ColliderShape::Mesh {
                mesh: mesh.clone(),
                convex: false,
            },
            ColliderMode::MeshConvex => ColliderShape::Mesh {
                mesh: mesh.clone(),
                convex: true,
            },
        };

        Some(Collider {
            shape,
            enabled: options.start_colliders_enabled,
        })
    }
}

impl<L: StreamProvider> ImportContext<'_, L> {
    fn primitive_definition(&self, mesh: usize, primitive: usize) -> Result<&Primitive, ImportError> {
        let document = self.document();
        let definition = &document.meshes[check_range(AssetKind::Mesh, mesh, document.meshes.len())?];
        Ok(&definition.primitives[check_range(AssetKind::Primitive, primitive, definition.primitives.len())?])
    }

    /// First phase: every buffer the primitive reads is loaded and its accessors are validated.
    pub async fn primitive_accessors(&self, mesh: usize, primitive: usize) -> Result<Arc<MeshCacheData>, ImportError> {
        let slot = self.cache().mesh_slot_index(mesh, primitive)?;
        self.cache()
            .meshes
            .get_or_build(slot, move || async move {
                let definition = self.primitive_definition(mesh, primitive)?;
                let mut attributes = HashMap::new();
                for (semantic, accessor) in MeshImporter::primitive_accessors(definition) {
                    attributes.insert(semantic, self.accessor(accessor).await?);
                }

                let morph_targets = definition.targets.as_ref().map_or(0, Vec::len);
                Ok(MeshCacheData::new(attributes, morph_targets))
            })
            .await
    }

    /// Second phase: decodes and converts the vertex streams and creates the renderable mesh. Primitives
    /// that are not triangle lists are rejected with [`ImportError::UnsupportedFormat`].
    pub async fn primitive_mesh(&self, mesh: usize, primitive: usize) -> Result<Arc<RenderMesh>, ImportError> {
        let data = self.primitive_accessors(mesh, primitive).await?;
        if let Some(loaded) = data.loaded_mesh.get() {
            return Ok(loaded);
        }

        let definition = self.primitive_definition(mesh, primitive)?;
        if definition.mode != PRIMITIVE_MODE_TRIANGLES {
            return Err(ImportError::unsupported(format!(
                "primitive {} of mesh {} uses mode {}, only triangle lists are supported",
                primitive, mesh, definition.mode
            )));
        }

        let slot = self.cache().mesh_slot_index(mesh, primitive)?;
        let writer = data.loaded_mesh.begin(AssetKind::Primitive, slot)?;
        let attributes = data.attributes_snapshot();

        let mesh_data = if self.options.multithreaded {
            tokio::task::spawn_blocking(move || MeshImporter::build_mesh_data(&attributes)).await??
        } else {
            MeshImporter::build_mesh_data(&attributes)?
        };
        self.checkpoint("mesh decode").await?;

        let document = self.document();
        let name = MeshImporter::mesh_name(
            document.meshes[mesh].name.as_deref(),
            mesh,
            primitive,
            document.meshes[mesh].primitives.len(),
        );
        let render_mesh = writer.publish(RenderMesh::new(name, mesh_data, self.options.keep_cpu_copy_of_mesh));
        // the accessors hold buffer references, they are not needed once the mesh exists
        data.clear_attributes();
        self.session.record.add_mesh(render_mesh.clone());
        self.checkpoint("mesh upload").await?;
        Ok(render_mesh)
    }

    /// Builds every primitive of `mesh`, skipping the ones that cannot be represented.
    pub async fn mesh_primitives(&self, mesh: usize) -> Result<Vec<Option<Arc<RenderMesh>>>, ImportError> {
        let document = self.document();
        let count = document.meshes[check_range(AssetKind::Mesh, mesh, document.meshes.len())?]
            .primitives
            .len();

        let mut primitives = Vec::with_capacity(count);
        for primitive in 0..count {
            match self.primitive_mesh(mesh, primitive).await {
                Ok(loaded) => primitives.push(Some(loaded)),
                Err(err) if !err.is_fatal() => {
                    warn!("Skipping primitive {} of mesh {}: {}", primitive, mesh, err);
                    primitives.push(None);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(primitives)
    }
}
