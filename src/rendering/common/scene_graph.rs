use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::rendering::asset_graph::instantiation::InstantiatedGltfObject;
use crate::rendering::common::animation::AnimationClip;
use crate::rendering::common::types::{RenderMaterial, RenderMesh};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneObjectId(usize);

impl SceneObjectId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone)]
pub struct SkinBinding {
    pub bones: Vec<SceneObjectId>,
    pub root_bone: Option<SceneObjectId>,
    pub bind_poses: Vec<Mat4>,
}

#[derive(Debug, Clone)]
pub enum Renderer {
    Static {
        mesh: Arc<RenderMesh>,
        material: Arc<RenderMaterial>,
    },
    /// Used for skinned primitives as well as primitives carrying morph targets.
    Skinned {
        mesh: Arc<RenderMesh>,
        material: Arc<RenderMaterial>,
        skin: Option<SkinBinding>,
        blend_shape_count: usize,
    },
}

impl Renderer {
    pub fn mesh(&self) -> &Arc<RenderMesh> {
        match self {
            Renderer::Static { mesh, .. } | Renderer::Skinned { mesh, .. } => mesh,
        }
    }

    pub fn material(&self) -> &Arc<RenderMaterial> {
        match self {
            Renderer::Static { material, .. } | Renderer::Skinned { material, .. } => material,
        }
    }

    pub fn skin(&self) -> Option<&SkinBinding> {
        match self {
            Renderer::Static { .. } => None,
            Renderer::Skinned { skin, .. } => skin.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ColliderShape {
    Box { center: Vec3, size: Vec3 },
    Mesh { mesh: Arc<RenderMesh>, convex: bool },
}

#[derive(Debug, Clone)]
pub struct Collider {
    pub shape: ColliderShape,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct LodLevel {
    /// Screen relative height below which the next level takes over.
    pub coverage: f32,
    pub renderers: Vec<SceneObjectId>,
}

#[derive(Debug, Clone, Default)]
pub struct LodGroup {
    pub levels: Vec<LodLevel>,
}

#[derive(Debug, Clone, Default)]
pub struct AnimationComponent {
    pub clips: Vec<Arc<AnimationClip>>,
    pub default_clip: Option<usize>,
}

impl AnimationComponent {
    pub fn default_clip(&self) -> Option<&Arc<AnimationClip>> {
        self.default_clip.and_then(|index| self.clips.get(index))
    }
}

#[derive(Debug)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
    pub active: bool,
    /// The untouched source matrix, when the document specified one instead of TRS.
    pub source_matrix: Option<Mat4>,
    pub renderer: Option<Renderer>,
    pub collider: Option<Collider>,
    pub lod_group: Option<LodGroup>,
    pub animation: Option<AnimationComponent>,
    pub instantiated: Option<InstantiatedGltfObject>,
    parent: Option<SceneObjectId>,
    children: Vec<SceneObjectId>,
    alive: bool,
}

impl SceneObject {
    fn new(name: String) -> Self {
        Self {
            name,
            transform: Transform::default(),
            active: true,
            source_matrix: None,
            renderer: None,
            collider: None,
            lod_group: None,
            animation: None,
            instantiated: None,
            parent: None,
            children: vec![],
            alive: true,
        }
    }

    pub fn parent(&self) -> Option<SceneObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[SceneObjectId] {
        &self.children
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// An arena of scene objects forming a forest. Destroyed objects keep their id, so stale ids never alias.
#[derive(Debug, Default)]
pub struct SceneGraph {
    objects: Vec<SceneObject>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: impl Into<String>) -> SceneObjectId {
        self.objects.push(SceneObject::new(name.into()));
        SceneObjectId(self.objects.len() - 1)
    }

    pub fn get(&self, id: SceneObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0).filter(|obj| obj.alive)
    }

    pub fn get_mut(&mut self, id: SceneObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id.0).filter(|obj| obj.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.objects.iter().filter(|obj| obj.alive).count()
    }

    pub fn roots(&self) -> Vec<SceneObjectId> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, obj)| obj.alive && obj.parent.is_none())
            .map(|(i, _)| SceneObjectId(i))
            .collect()
    }

    pub fn is_ancestor(&self, ancestor: SceneObjectId, id: SceneObjectId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.get(cur).and_then(|obj| obj.parent);
        }
        false
    }

    /// Moves `child` below `parent`, keeping its local transform. Returns false if that would create a cycle.
    pub fn attach(&mut self, child: SceneObjectId, parent: SceneObjectId) -> bool {
        if self.get(child).is_none() || self.get(parent).is_none() || self.is_ancestor(child, parent) {
            return false;
        }

        self.detach(child);
        if let Some(parent_obj) = self.get_mut(parent) {
            parent_obj.children.push(child);
        }
        if let Some(child_obj) = self.get_mut(child) {
            child_obj.parent = Some(parent);
        }
        true
    }

    pub fn detach(&mut self, child: SceneObjectId) {
        let Some(parent) = self.get(child).and_then(|obj| obj.parent) else {
            return;
        };

        if let Some(parent_obj) = self.get_mut(parent) {
            parent_obj.children.retain(|&c| c != child);
        }
        if let Some(child_obj) = self.get_mut(child) {
            child_obj.parent = None;
        }
    }

    pub fn set_active(&mut self, id: SceneObjectId, active: bool) {
        if let Some(obj) = self.get_mut(id) {
            obj.active = active;
        }
    }

    /// The object and everything below it, depth first, pre-order.
    pub fn descendants(&self, id: SceneObjectId) -> Vec<SceneObjectId> {
        let mut result = vec![];
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(obj) = self.get(cur) else {
                continue;
            };
            result.push(cur);
            stack.extend(obj.children.iter().rev());
        }
        result
    }

    /// Slash separated names from (excluding) `root` down to `target`, None if target is not below root.
    pub fn relative_path(&self, target: SceneObjectId, root: SceneObjectId) -> Option<String> {
        let mut path = vec![];
        let mut current = Some(target);
        while let Some(cur) = current {
            if cur == root {
                path.reverse();
                return Some(path.join("/"));
            }
            let obj = self.get(cur)?;
            path.push(obj.name.as_str());
            current = obj.parent;
        }
        None
    }

    pub fn find_by_name(&self, root: SceneObjectId, name: &str) -> Option<SceneObjectId> {
        self.descendants(root)
            .into_iter()
            .find(|&id| self.get(id).is_some_and(|obj| obj.name == name))
    }

    /// Destroys the object and its whole subtree, dropping all components. Returns the number of destroyed objects.
    pub fn destroy(&mut self, id: SceneObjectId) -> usize {
        self.detach(id);
        let subtree = self.descendants(id);
        for &cur in &subtree {
            let obj = &mut self.objects[cur.0];
            obj.alive = false;
            obj.children.clear();
            obj.parent = None;
            obj.renderer = None;
            obj.collider = None;
            obj.lod_group = None;
            obj.animation = None;
            // releases the instantiation record, unless someone else still holds a clone
            obj.instantiated = None;
        }
        subtree.len()
    }
}
