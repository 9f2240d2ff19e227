use std::collections::HashSet;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use gltfstream_files::gltf::extensions::{KnownExtension, MsftLod};
use gltfstream_files::gltf::types::{Document, Node};
use itertools::Itertools;
use log::{debug, trace};

use crate::error::{AssetKind, ImportError, check_range};
use crate::io::common::loader::StreamProvider;
use crate::rendering::asset_graph::cache_data::NodeCacheData;
use crate::rendering::common::coordinate_systems::{convert_matrix, convert_rotation, convert_vec3};
use crate::rendering::common::scene_graph::{
    LodGroup, LodLevel, Renderer, SceneObjectId, SkinBinding, Transform,
};
use crate::rendering::importer::context::{ImportContext, ImportFuture};
use crate::rendering::importer::mesh_importer::MeshImporter;

pub struct NodeImporter {}

impl NodeImporter {
    pub fn node_name(node: &Node, index: usize) -> String {
        node.name.clone().unwrap_or_else(|| format!("GLTFNode{}", index))
    }

    /// The converted local transform, plus the source matrix when the node is given in matrix form.
    pub fn local_transform(node: &Node) -> (Transform, Option<Mat4>) {
        if let Some(matrix) = node.matrix {
            let matrix = Mat4::from_cols_array(&matrix);
            if matrix != Mat4::IDENTITY {
                return (Transform::from_matrix(convert_matrix(matrix)), Some(matrix));
            }
        }

        let transform = Transform {
            translation: node.translation.map_or(Vec3::ZERO, |t| convert_vec3(Vec3::from_array(t))),
            rotation: node
                .rotation
                .map_or(Quat::IDENTITY, |r| convert_rotation(Quat::from_array(r))),
            scale: node.scale.map_or(Vec3::ONE, Vec3::from_array),
        };
        (transform, None)
    }

    /// The lower detail levels of a node, empty unless the document declares MSFT_lod.
    pub fn lod_ids(document: &Document, node: &Node) -> Result<Vec<usize>, ImportError> {
        if !document.uses_extension(MsftLod::NAME) {
            return Ok(vec![]);
        }
        Ok(node.lod()?.map(|lod| lod.ids).unwrap_or_default())
    }

    /// Screen coverage below which `level` hands over to the next one.
    pub fn lod_coverage(coverage: Option<&[f32]>, level: usize) -> f32 {
        coverage
            .and_then(|coverage| coverage.get(level).copied())
            .unwrap_or(1.0 / (level as f32 + 2.0))
    }

    /// Every node reachable from `roots` through children, detail levels and skin joints, depth first,
    /// each once.
    pub fn reachable_nodes(document: &Document, roots: &[usize]) -> Result<Vec<usize>, ImportError> {
        let mut visited = HashSet::new();
        let mut order = vec![];
        let mut stack = roots.iter().rev().copied().collect_vec();

        while let Some(index) = stack.pop() {
            check_range(AssetKind::Node, index, document.nodes.len())?;
            if !visited.insert(index) {
                continue;
            }
            order.push(index);

            let node = &document.nodes[index];
            let mut next = node.children.clone();
            next.extend(NodeImporter::lod_ids(document, node)?);
            if let Some(skin) = node.skin {
                let skin = &document.skins[check_range(AssetKind::Skin, skin, document.skins.len())?];
                next.extend(&skin.joints);
                next.extend(skin.skeleton);
            }
            stack.extend(next.into_iter().rev());
        }
        Ok(order)
    }
}

impl<L: StreamProvider> ImportContext<'_, L> {
    /// Builds the node, its renderers and its whole subtree. The node object is published before the children
    /// are built, so joints further down can refer back to it. Returns the existing node if it has been built
    /// already (e.g. as a joint), the caller re-parents it.
    pub fn construct_node(&self, index: usize) -> ImportFuture<'_, Arc<NodeCacheData>> {
        Box::pin(async move {
            let table = &self.cache().nodes;
            if let Some(existing) = table.get(index)? {
                return Ok(existing);
            }
            if table.slot(index)?.is_in_flight() {
                return Err(ImportError::malformed(format!("node {} is its own ancestor", index)));
            }

            let writer = table.begin(index)?;
            let document = self.document();
            let node = &document.nodes[index];

            let (transform, source_matrix) = NodeImporter::local_transform(node);
            let object = self.with_graph(|graph| {
                let object = graph.create(NodeImporter::node_name(node, index));
                if let Some(created) = graph.get_mut(object) {
                    created.transform = transform;
                    created.source_matrix = source_matrix;
                    created.active = false;
                }
                object
            });
            let data = writer.publish(NodeCacheData::new(object));
            trace!("Node {} is object {:?}", index, object);

            if let Some(mesh) = node.mesh {
                self.attach_mesh(node, mesh, object).await?;
            }

            for &child in &node.children {
                let child_data = self.construct_child(child).await?;
                self.attach_object(child_data.attach_point(), object)?;
            }

            let lod_ids = NodeImporter::lod_ids(document, node)?;
            if !lod_ids.is_empty() {
                let group = self.build_lod_group(index, node, object, &lod_ids).await?;
                data.set_lod_group(group);
            }

            self.checkpoint("node").await?;
            Ok(data)
        })
    }

    /// A child that is still being built is one of our ancestors.
    async fn construct_child(&self, child: usize) -> Result<Arc<NodeCacheData>, ImportError> {
        if self.cache().nodes.slot(child)?.is_in_flight() {
            return Err(ImportError::malformed(format!(
                "node {} is referenced as a child of its own subtree",
                child
            )));
        }
        self.construct_node(child).await
    }

    pub fn attach_object(&self, child: SceneObjectId, parent: SceneObjectId) -> Result<(), ImportError> {
        self.with_graph(|graph| {
            if !graph.attach(child, parent) {
                return Err(ImportError::malformed(format!(
                    "attaching {:?} to {:?} would create a cycle",
                    child, parent
                )));
            }
            graph.set_active(child, true);
            Ok(())
        })
    }

    async fn attach_mesh(&self, node: &Node, mesh: usize, object: SceneObjectId) -> Result<(), ImportError> {
        let primitives = self.mesh_primitives(mesh).await?;
        let definitions = &self.document().meshes[mesh].primitives;
        let skin = match node.skin {
            Some(skin) => Some(self.skin_binding(skin).await?),
            None => None,
        };

        for (primitive, (definition, loaded)) in definitions.iter().zip(primitives).enumerate() {
            let Some(render_mesh) = loaded else {
                continue;
            };

            let material = self.primitive_material(definition.material).await?;
            let material = material.variant(definition.attributes.contains_key("COLOR_0")).clone();
            let morph_targets = definition.targets.as_ref().map_or(0, Vec::len);

            let renderer = if skin.is_some() || morph_targets > 0 {
                Renderer::Skinned {
                    mesh: render_mesh.clone(),
                    material,
                    skin: skin.clone(),
                    blend_shape_count: morph_targets,
                }
            } else {
                Renderer::Static {
                    mesh: render_mesh.clone(),
                    material,
                }
            };
            let collider = MeshImporter::collider(self.options.collider, &render_mesh, self.options);

            self.with_graph(|graph| {
                let target = if definitions.len() == 1 {
                    object
                } else {
                    let child = graph.create("Primitive");
                    graph.attach(child, object);
                    child
                };
                if let Some(target) = graph.get_mut(target) {
                    target.renderer = Some(renderer);
                    target.collider = collider;
                }
            });
            trace!("Attached primitive {} of mesh {}", primitive, mesh);
        }
        Ok(())
    }

    /// Bones (building joints that are not there yet), root bone and bind poses of a skin.
    async fn skin_binding(&self, skin: usize) -> Result<SkinBinding, ImportError> {
        let document = self.document();
        let skin = &document.skins[check_range(AssetKind::Skin, skin, document.skins.len())?];

        let bind_poses = match skin.inverse_bind_matrices {
            Some(accessor) => self
                .accessor(accessor)
                .await?
                .to_mat4s()?
                .into_iter()
                .map(convert_matrix)
                .collect_vec(),
            None => vec![Mat4::IDENTITY; skin.joints.len()],
        };
        if bind_poses.len() < skin.joints.len() {
            return Err(ImportError::malformed(format!(
                "skin has {} joints but only {} inverse bind matrices",
                skin.joints.len(),
                bind_poses.len()
            )));
        }

        let mut bones = Vec::with_capacity(skin.joints.len());
        for &joint in &skin.joints {
            bones.push(self.construct_node(joint).await?.object);
        }

        let root_bone = match skin.skeleton {
            Some(skeleton) => Some(self.construct_node(skeleton).await?.object),
            None => bones.first().copied(),
        };

        Ok(SkinBinding {
            bones,
            root_bone,
            bind_poses,
        })
    }

    /// Wraps the node into a group that switches between it and its lower detail levels.
    async fn build_lod_group(
        &self,
        index: usize,
        node: &Node,
        object: SceneObjectId,
        lod_ids: &[usize],
    ) -> Result<SceneObjectId, ImportError> {
        let name = node
            .name
            .clone()
            .unwrap_or_else(|| format!("GLTFNode_LODGroup{}", index));
        let group = self.with_graph(|graph| {
            let group = graph.create(name);
            graph.set_active(group, false);
            group
        });
        self.attach_object(object, group)?;

        let coverage = node.lod_coverage();
        let mut levels = vec![LodLevel {
            coverage: NodeImporter::lod_coverage(coverage.as_deref(), 0),
            renderers: self.renderers_under(object),
        }];

        for (level, &lod) in lod_ids.iter().enumerate() {
            let lod_data = self.construct_child(lod).await?;
            self.attach_object(lod_data.attach_point(), group)?;
            levels.push(LodLevel {
                coverage: NodeImporter::lod_coverage(coverage.as_deref(), level + 1),
                renderers: self.renderers_under(lod_data.object),
            });
        }

        if !self.options.cull_far_lod
            && let Some(last) = levels.last()
        {
            let tail = LodLevel {
                coverage: 0.0,
                renderers: last.renderers.clone(),
            };
            levels.push(tail);
        }

        debug!("Node {} has {} detail levels", index, levels.len());
        self.with_graph(|graph| {
            if let Some(group) = graph.get_mut(group) {
                group.lod_group = Some(LodGroup { levels });
            }
        });
        Ok(group)
    }

    fn renderers_under(&self, object: SceneObjectId) -> Vec<SceneObjectId> {
        self.read_graph(|graph| {
            graph
                .descendants(object)
                .into_iter()
                .filter(|&id| graph.get(id).is_some_and(|o| o.renderer.is_some()))
                .collect_vec()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: &str) -> Document {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn matrix_nodes_keep_their_source_matrix() {
        let node: Node = serde_json::from_str(
            r#"{ "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 2,3,4,1] }"#,
        )
        .unwrap();
        let (transform, source) = NodeImporter::local_transform(&node);
        assert!(transform.translation.abs_diff_eq(Vec3::new(-2.0, 3.0, 4.0), 1e-6));
        assert_eq!(source.map(|m| m.w_axis.x), Some(2.0));

        let identity: Node = serde_json::from_str(r#"{ "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1], "scale": [2, 2, 2] }"#)
            .unwrap();
        let (transform, source) = NodeImporter::local_transform(&identity);
        assert_eq!(source, None);
        assert_eq!(transform.scale, Vec3::splat(2.0));
    }

    #[test]
    fn lod_coverage_falls_off_without_extras() {
        assert_eq!(NodeImporter::lod_coverage(None, 0), 0.5);
        assert_eq!(NodeImporter::lod_coverage(None, 2), 0.25);
        assert_eq!(NodeImporter::lod_coverage(Some(&[0.7, 0.3][..]), 1), 0.3);
        assert_eq!(NodeImporter::lod_coverage(Some(&[0.7][..]), 1), 1.0 / 3.0);
    }

    #[test]
    fn lod_is_ignored_unless_declared() {
        let node = r#"{ "extensions": { "MSFT_lod": { "ids": [1, 2] } } }"#;
        let declared = document(&format!(r#"{{ "extensionsUsed": ["MSFT_lod"], "nodes": [{}, {{}}, {{}}] }}"#, node));
        let undeclared = document(&format!(r#"{{ "nodes": [{}, {{}}, {{}}] }}"#, node));
        assert_eq!(NodeImporter::lod_ids(&declared, &declared.nodes[0]).unwrap(), vec![1, 2]);
        assert!(NodeImporter::lod_ids(&undeclared, &undeclared.nodes[0]).unwrap().is_empty());
    }

    #[test]
    fn reachable_nodes_survive_cycles() {
        let doc = document(r#"{ "nodes": [{ "children": [1] }, { "children": [0, 2] }, {}] }"#);
        assert_eq!(NodeImporter::reachable_nodes(&doc, &[0]).unwrap(), vec![0, 1, 2]);

        let broken = document(r#"{ "nodes": [{ "children": [5] }] }"#);
        assert!(matches!(
            NodeImporter::reachable_nodes(&broken, &[0]),
            Err(ImportError::Range {
                kind: AssetKind::Node,
                index: 5,
                ..
            })
        ));
    }
}
