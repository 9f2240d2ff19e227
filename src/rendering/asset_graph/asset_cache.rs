use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arc_swap::ArcSwapOption;
use gltfstream_files::gltf::types::Document;
use log::trace;

use crate::error::{AssetKind, ImportError, check_range};
use crate::io::common::loader::{Stream, StreamProvider};
use crate::rendering::asset_graph::cache_data::{
    AnimationCacheData, BufferCacheData, ImageCacheData, ImageStream, MaterialCacheData, MeshCacheData,
    NodeCacheData, TextureCacheData,
};

/// A write-once cell. While a builder is running the slot is "in flight", a second builder for the same slot is
/// rejected instead of silently duplicating work.
pub struct Slot<T> {
    value: ArcSwapOption<T>,
    in_flight: AtomicBool,
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self {
            value: ArcSwapOption::empty(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value.load_full()
    }

    pub fn is_populated(&self) -> bool {
        self.value.load().is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the slot for construction. Fails if it is populated already or someone else is building it.
    pub fn begin(&self, kind: AssetKind, index: usize) -> Result<SlotWriter<'_, T>, ImportError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ImportError::Reentrant { kind, index });
        }

        // dropping the writer releases the claim again
        let writer = SlotWriter { slot: self };
        if self.is_populated() {
            return Err(ImportError::Reentrant { kind, index });
        }
        Ok(writer)
    }

    /// Removes the value, only used when the owning cache is being torn down.
    pub fn take(&self) -> Option<Arc<T>> {
        self.value.swap(None)
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to populate a slot. The value may be published before the builder has finished (so that
/// dependants further down can see it), the slot stays in flight until the writer is dropped.
pub struct SlotWriter<'a, T> {
    slot: &'a Slot<T>,
}

impl<T> SlotWriter<'_, T> {
    pub fn publish(&self, value: T) -> Arc<T> {
        let arc = Arc::new(value);
        self.slot.value.store(Some(arc.clone()));
        arc
    }
}

impl<T> Drop for SlotWriter<'_, T> {
    fn drop(&mut self) {
        self.slot.in_flight.store(false, Ordering::Release);
    }
}

/// One slot per entry of a document collection, sized when the document is known.
pub struct SlotTable<T> {
    kind: AssetKind,
    slots: Vec<Slot<T>>,
    builds: AtomicUsize,
}

impl<T> SlotTable<T> {
    pub fn new(kind: AssetKind, len: usize) -> Self {
        Self {
            kind,
            slots: (0..len).map(|_| Slot::new()).collect(),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Result<&Slot<T>, ImportError> {
        check_range(self.kind, index, self.slots.len())?;
        Ok(&self.slots[index])
    }

    pub fn get(&self, index: usize) -> Result<Option<Arc<T>>, ImportError> {
        Ok(self.slot(index)?.get())
    }

    pub fn begin(&self, index: usize) -> Result<SlotWriter<'_, T>, ImportError> {
        let writer = self.slot(index)?.begin(self.kind, index)?;
        self.builds.fetch_add(1, Ordering::Relaxed);
        trace!("Building {} {}", self.kind, index);
        Ok(writer)
    }

    /// Returns the populated slot or runs `build` exactly once to populate it. `build` may in turn require
    /// other slots, but never the one it is building.
    pub async fn get_or_build<F, Fut>(&self, index: usize, build: F) -> Result<Arc<T>, ImportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ImportError>>,
    {
        if let Some(value) = self.get(index)? {
            return Ok(value);
        }

        let writer = self.begin(index)?;
        let value = build().await?;
        Ok(writer.publish(value))
    }

    /// How often a builder has been started for any slot of this table.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_populated()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<T>> + '_ {
        self.slots.iter().filter_map(|slot| slot.get())
    }

    pub fn take_all(&self) -> Vec<Arc<T>> {
        self.slots.iter().filter_map(|slot| slot.take()).collect()
    }
}

/// The per-import memoization of everything that is derived from one document.
pub struct AssetCache {
    pub buffers: SlotTable<BufferCacheData>,
    pub image_streams: SlotTable<ImageStream>,
    pub images: SlotTable<ImageCacheData>,
    pub textures: SlotTable<TextureCacheData>,
    pub materials: SlotTable<MaterialCacheData>,
    /// Flattened over (mesh, primitive), see [`AssetCache::mesh_slot_index`].
    pub meshes: SlotTable<MeshCacheData>,
    pub nodes: SlotTable<NodeCacheData>,
    pub animations: SlotTable<AnimationCacheData>,
    pub default_material: Slot<MaterialCacheData>,
    source_stream: Slot<Stream>,
    mesh_offsets: Vec<usize>,
    primitive_counts: Vec<usize>,
    decodes: AtomicUsize,
    color_space_conflicts: AtomicUsize,
}

impl AssetCache {
    /// `source` is the stream the document came from, binary containers keep their BIN chunk in it.
    pub fn new(document: &Document, source: Option<Arc<Stream>>) -> Self {
        let primitive_counts: Vec<usize> = document.meshes.iter().map(|mesh| mesh.primitives.len()).collect();
        let mesh_offsets: Vec<usize> = primitive_counts
            .iter()
            .scan(0, |offset, count| {
                let start = *offset;
                *offset += count;
                Some(start)
            })
            .collect();
        let primitive_total = primitive_counts.iter().sum();

        let source_stream = Slot::new();
        source_stream.value.store(source);

        Self {
            buffers: SlotTable::new(AssetKind::Buffer, document.buffers.len()),
            image_streams: SlotTable::new(AssetKind::ImageStream, document.images.len()),
            images: SlotTable::new(AssetKind::Image, document.images.len()),
            textures: SlotTable::new(AssetKind::Texture, document.textures.len()),
            materials: SlotTable::new(AssetKind::Material, document.materials.len()),
            meshes: SlotTable::new(AssetKind::Primitive, primitive_total),
            nodes: SlotTable::new(AssetKind::Node, document.nodes.len()),
            animations: SlotTable::new(AssetKind::Animation, document.animations.len()),
            default_material: Slot::new(),
            source_stream,
            mesh_offsets,
            primitive_counts,
            decodes: AtomicUsize::new(0),
            color_space_conflicts: AtomicUsize::new(0),
        }
    }

    pub fn source_stream(&self) -> Option<Arc<Stream>> {
        self.source_stream.get()
    }

    pub fn mesh_slot_index(&self, mesh: usize, primitive: usize) -> Result<usize, ImportError> {
        check_range(AssetKind::Mesh, mesh, self.mesh_offsets.len())?;
        check_range(AssetKind::Primitive, primitive, self.primitive_counts[mesh])?;
        Ok(self.mesh_offsets[mesh] + primitive)
    }

    pub fn record_decode(&self) {
        self.decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    /// A texture was requested in the other color space than it was first built with.
    pub fn record_color_space_conflict(&self) {
        self.color_space_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn color_space_conflicts(&self) -> usize {
        self.color_space_conflicts.load(Ordering::Relaxed)
    }

    pub fn build_counts(&self) -> HashMap<AssetKind, usize> {
        HashMap::from([
            (self.buffers.kind(), self.buffers.build_count()),
            (self.image_streams.kind(), self.image_streams.build_count()),
            (self.images.kind(), self.images.build_count()),
            (self.textures.kind(), self.textures.build_count()),
            (self.materials.kind(), self.materials.build_count()),
            (self.meshes.kind(), self.meshes.build_count()),
            (self.nodes.kind(), self.nodes.build_count()),
            (self.animations.kind(), self.animations.build_count()),
        ])
    }

    /// Releases every stream this import holds, handing them back to `provider`. Renderable objects are not
    /// touched, they are owned by the instantiation record and the global texture cache. Returns the number of
    /// streams the provider pooled.
    pub fn dispose<L: StreamProvider>(&self, provider: &L) -> usize {
        let mut streams = vec![];

        for image in self.image_streams.take_all() {
            if let Ok(ImageStream::Bytes(stream)) = Arc::try_unwrap(image) {
                streams.push(Arc::new(stream));
            }
        }

        for buffer in self.buffers.take_all() {
            // accessors may still be alive while an import is being torn down mid-way
            if let Ok(buffer) = Arc::try_unwrap(buffer) {
                streams.push(buffer.stream);
            }
        }
        streams.extend(self.source_stream.take());

        // streams shared by several buffers: only the last Arc succeeds
        let mut pooled = 0;
        for stream in streams {
            if let Ok(stream) = Arc::try_unwrap(stream)
                && provider.give_back(stream)
            {
                pooled += 1;
            }
        }

        self.textures.take_all();
        self.images.take_all();
        self.materials.take_all();
        self.meshes.take_all();
        self.animations.take_all();
        self.default_material.take();

        trace!("Asset cache disposed, {} streams pooled", pooled);
        pooled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_at_most_once() {
        let table: SlotTable<u32> = SlotTable::new(AssetKind::Buffer, 2);
        let a = table.get_or_build(0, || async { Ok(7) }).await.unwrap();
        let b = table.get_or_build(0, || async { Ok(8) }).await.unwrap();
        assert_eq!((*a, *b), (7, 7));
        assert_eq!(table.build_count(), 1);
        assert_eq!(table.populated(), 1);
    }

    #[tokio::test]
    async fn out_of_range_is_a_range_error() {
        let table: SlotTable<u32> = SlotTable::new(AssetKind::Mesh, 1);
        let err = table.get_or_build(3, || async { Ok(1) }).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::Range {
                kind: AssetKind::Mesh,
                index: 3,
                count: 1
            }
        ));
    }

    #[test]
    fn in_flight_slot_rejects_a_second_builder() {
        let table: SlotTable<u32> = SlotTable::new(AssetKind::Node, 1);
        let writer = table.begin(0).unwrap();
        assert!(matches!(table.begin(0), Err(ImportError::Reentrant { .. })));

        writer.publish(1);
        // still in flight until the writer is gone
        assert!(table.slot(0).unwrap().is_in_flight());
        drop(writer);
        assert!(!table.slot(0).unwrap().is_in_flight());
        assert!(matches!(table.begin(0), Err(ImportError::Reentrant { .. })));
    }

    #[tokio::test]
    async fn failed_builder_leaves_the_slot_empty() {
        let table: SlotTable<u32> = SlotTable::new(AssetKind::Texture, 1);
        let result = table
            .get_or_build(0, || async { Err(ImportError::unsupported("nope")) })
            .await;
        assert!(result.is_err());
        assert!(!table.slot(0).unwrap().is_in_flight());
        assert_eq!(table.get(0).unwrap(), None);
    }
}
