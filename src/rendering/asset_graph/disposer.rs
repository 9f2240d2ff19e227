use std::sync::{Arc, Mutex};

use log::trace;

use crate::rendering::common::types::{RenderMaterial, RenderMesh, TextureHandle};

#[derive(Debug, Clone)]
pub enum DisposableObject {
    Texture(TextureHandle),
    Mesh(Arc<RenderMesh>),
    Material(Arc<RenderMaterial>),
}

impl DisposableObject {
    /// Returns true if this call actually destroyed the object.
    pub fn destroy(&self) -> bool {
        match self {
            DisposableObject::Texture(texture) => texture.destroy(),
            DisposableObject::Mesh(mesh) => mesh.destroy(),
            DisposableObject::Material(material) => material.destroy(),
        }
    }
}

/// Decides when engine objects that are no longer referenced are actually destroyed. The importer only ever
/// hands objects to the disposer and never destroys them on its own.
pub trait ObjectDisposer: Send + Sync {
    fn dispose(&self, object: DisposableObject);
}

#[derive(Debug, Default)]
pub struct ImmediateDisposer {}

impl ObjectDisposer for ImmediateDisposer {
    fn dispose(&self, object: DisposableObject) {
        trace!("Destroying {:?}", object);
        object.destroy();
    }
}

/// Queues objects until the host calls [`DeferredDisposer::flush`], e.g. at the end of a frame.
#[derive(Debug, Default)]
pub struct DeferredDisposer {
    queue: Mutex<Vec<DisposableObject>>,
}

impl DeferredDisposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().expect("Disposer Queue Lock").len()
    }

    /// Destroys everything queued so far, returns how many objects were destroyed by this call.
    pub fn flush(&self) -> usize {
        let queued = std::mem::take(&mut *self.queue.lock().expect("Disposer Queue Lock"));
        queued.iter().filter(|object| object.destroy()).count()
    }
}

impl ObjectDisposer for DeferredDisposer {
    fn dispose(&self, object: DisposableObject) {
        self.queue.lock().expect("Disposer Queue Lock").push(object);
    }
}
