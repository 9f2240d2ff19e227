use std::ops::Range;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use gltfstream_files::gltf::types::Document;
use log::trace;

use crate::error::ImportError;
use crate::io::common::loader::{Stream, StreamProvider};
use crate::io::common::uri::{DataUri, resolve_uri};
use crate::rendering::asset_graph::asset_cache::AssetCache;
use crate::rendering::asset_graph::cache_data::BufferCacheData;
use crate::rendering::asset_graph::disposer::ObjectDisposer;
use crate::rendering::asset_graph::global_texture_cache::GlobalTextureCache;
use crate::rendering::asset_graph::instantiation::RefCountedCacheData;
use crate::rendering::asset_graph::scheduler::{CancelToken, FrameScheduler};
use crate::rendering::common::scene_graph::SceneGraph;
use crate::rendering::importer::accessor::AttributeAccessor;
use crate::rendering::importer::state::{ImportState, StateTracker};
use crate::settings::ImportOptions;

/// Boxed, so that the node and material builders can recurse. Never `Send`: everything that creates scene
/// objects runs on the host thread, only the pure conversions are handed to the blocking pool.
pub(crate) type ImportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ImportError>> + 'a>>;

/// Everything that lives exactly as long as one parsed document.
pub(crate) struct ImportSession {
    pub document: Arc<Document>,
    pub cache: AssetCache,
    /// Directory of the document, relative uris resolve against it.
    pub base_directory: String,
    pub binary_chunk: Option<Range<usize>>,
    pub record: Arc<RefCountedCacheData>,
    /// Cleared while a load works through the session. A session that is not settled when the next load
    /// starts belongs to a load that failed or was dropped midway, its slots may be half built.
    pub settled: AtomicBool,
}

/// The borrowed view the per-asset importers work through.
pub(crate) struct ImportContext<'a, L: StreamProvider> {
    pub session: &'a ImportSession,
    pub provider: &'a Arc<L>,
    pub options: &'a ImportOptions,
    pub scheduler: &'a FrameScheduler,
    pub graph: &'a RwLock<SceneGraph>,
    pub global_textures: &'a Arc<GlobalTextureCache>,
    pub disposer: &'a Arc<dyn ObjectDisposer>,
    pub cancel: Option<&'a CancelToken>,
    pub state: &'a StateTracker,
}

impl<L: StreamProvider> ImportContext<'_, L> {
    pub fn document(&self) -> &Document {
        &self.session.document
    }

    pub fn cache(&self) -> &AssetCache {
        &self.session.cache
    }

    pub fn enter(&self, state: ImportState) {
        self.state.enter(state);
    }

    pub fn with_graph<R>(&self, f: impl FnOnce(&mut SceneGraph) -> R) -> R {
        let mut graph = self.graph.write().expect("Scene Graph Write Lock");
        f(&mut graph)
    }

    pub fn read_graph<R>(&self, f: impl FnOnce(&SceneGraph) -> R) -> R {
        let graph = self.graph.read().expect("Scene Graph Read Lock");
        f(&graph)
    }

    /// A suspension point: gives the frame back to the host when over budget, honoring cancellation on both
    /// sides of the yield.
    pub async fn checkpoint(&self, label: &str) -> Result<(), ImportError> {
        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }
        self.scheduler.yield_if_over_budget(label).await;
        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }
        Ok(())
    }

    pub fn resolve(&self, uri: &str) -> String {
        resolve_uri(&self.session.base_directory, uri)
    }

    /// Embedded payloads are decoded in place, everything else goes through the stream provider.
    pub async fn load_uri(&self, uri: &str) -> Result<Stream, ImportError> {
        if let Some(data) = DataUri::parse(uri) {
            return data
                .decode()
                .map(Stream::new)
                .map_err(|err| ImportError::malformed(format!("invalid data uri: {}", err)));
        }

        let path = self.resolve(uri);
        trace!("Loading {}", path);
        let stream = self.provider.load_stream(&path).await?;
        self.checkpoint(&path).await?;
        Ok(stream)
    }

    pub async fn buffer(&self, index: usize) -> Result<Arc<BufferCacheData>, ImportError> {
        self.cache()
            .buffers
            .get_or_build(index, move || async move {
                let definition = &self.document().buffers[index];
                match &definition.uri {
                    Some(uri) => {
                        let stream = self.load_uri(uri).await?;
                        BufferCacheData::new(Arc::new(stream), 0, definition.byte_length)
                    }
                    None => self.binary_chunk_buffer(index, definition.byte_length),
                }
            })
            .await
    }

    fn binary_chunk_buffer(&self, index: usize, byte_length: usize) -> Result<BufferCacheData, ImportError> {
        let (Some(chunk), Some(source)) = (&self.session.binary_chunk, self.cache().source_stream()) else {
            return Err(ImportError::malformed(format!(
                "buffer {} has no uri and the document carries no binary chunk",
                index
            )));
        };

        if index != 0 {
            return Err(ImportError::malformed(format!(
                "only buffer 0 may refer to the binary chunk, buffer {} has no uri",
                index
            )));
        }

        // the chunk is padded to 4 bytes, the buffer may be shorter
        if byte_length > chunk.len() {
            return Err(ImportError::malformed(format!(
                "buffer 0 declares {} bytes, the binary chunk only has {}",
                byte_length,
                chunk.len()
            )));
        }
        BufferCacheData::new(source, chunk.start, byte_length)
    }

    /// An accessor together with the buffer it reads from, loading that buffer first if needed.
    pub async fn accessor(&self, accessor_id: usize) -> Result<AttributeAccessor, ImportError> {
        let buffer = match AttributeAccessor::buffer_index(self.document(), accessor_id)? {
            Some(buffer) => Some(self.buffer(buffer).await?),
            None => None,
        };
        let accessor = AttributeAccessor::new(self.document(), accessor_id, buffer)?;

        match AttributeAccessor::sparse_buffer_indices(self.document(), accessor_id)? {
            Some((indices, values)) => {
                let indices = self.buffer(indices).await?;
                let values = self.buffer(values).await?;
                accessor.with_sparse(self.document(), &indices, &values)
            }
            None => Ok(accessor),
        }
    }
}
