use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use gltfstream_files::gltf::extensions::ExtensionKind;
use gltfstream_files::gltf::reader::GltfReader;
use gltfstream_files::gltf::types::{Document, GltfAsset};
use itertools::Itertools;
use log::{debug, error, info, trace, warn};

use crate::error::{AssetKind, ImportError, check_range};
use crate::io::common::loader::{Stream, StreamProvider};
use crate::io::common::uri::parent_directory;
use crate::rendering::asset_graph::asset_cache::AssetCache;
use crate::rendering::asset_graph::disposer::{ImmediateDisposer, ObjectDisposer};
use crate::rendering::asset_graph::global_texture_cache::GlobalTextureCache;
use crate::rendering::asset_graph::instantiation::{InstantiatedGltfObject, RefCountedCacheData};
use crate::rendering::asset_graph::scheduler::{CancelToken, FrameScheduler};
use crate::rendering::common::scene_graph::{AnimationComponent, SceneGraph, SceneObjectId};
use crate::rendering::common::types::RenderMaterial;
use crate::rendering::importer::context::{ImportContext, ImportSession};
use crate::rendering::importer::node_importer::NodeImporter;
use crate::rendering::importer::state::{BusyGuard, ImportState, ImportStats, StateTracker};
use crate::settings::ImportOptions;

pub const DEFAULT_SCENE_NAME: &str = "GLTFScene";

/// The document, parsed once per importer and shared by every import session it starts.
struct ParsedDocument {
    document: Arc<Document>,
    binary_chunk: Option<Range<usize>>,
    /// The container bytes, kept while the binary chunk may still be needed.
    source: Option<Arc<Stream>>,
    base_directory: String,
}

/// Streams one glTF document into a [`SceneGraph`].
///
/// Every load runs as a future that yields to the host whenever the frame budget of its [`FrameScheduler`] is
/// used up, so it can be driven from a frame loop (see [`crate::rendering::asset_graph::scheduler::FrameDriver`])
/// or awaited on a runtime. Only one load may be in flight per importer.
///
/// A load works through one import session: the per-document asset cache plus the instantiation record of
/// everything renderable it creates. Once a scene or node has been instantiated the record moves to the
/// top level object and the session's streams are handed back to the provider.
pub struct SceneImporter<L: StreamProvider> {
    path: Option<String>,
    provider: Arc<L>,
    options: ImportOptions,
    scheduler: Arc<FrameScheduler>,
    graph: Arc<RwLock<SceneGraph>>,
    global_textures: Arc<GlobalTextureCache>,
    disposer: Arc<dyn ObjectDisposer>,
    cancel: Option<CancelToken>,
    tracker: StateTracker,
    busy: Mutex<bool>,
    parsed: Mutex<Option<Arc<ParsedDocument>>>,
    session: Mutex<Option<Arc<ImportSession>>>,
    /// Records of abandoned sessions. What they built may still be referenced by partial objects in the
    /// graph, so they are only released on [`SceneImporter::dispose`].
    retired: Mutex<Vec<Arc<RefCountedCacheData>>>,
    last_stats: Mutex<ImportStats>,
}

impl<L: StreamProvider> SceneImporter<L> {
    /// `path` is handed to the provider as is, relative uris inside the document resolve against its
    /// directory.
    pub fn new(path: impl Into<String>, provider: Arc<L>, options: ImportOptions) -> Self {
        SceneImporter::create(Some(path.into()), None, provider, options)
    }

    /// Imports an already parsed document. `source` has to be the container the asset was parsed from if it
    /// carries a binary chunk.
    pub fn from_asset(
        asset: GltfAsset,
        source: Option<Stream>,
        base_directory: impl Into<String>,
        provider: Arc<L>,
        options: ImportOptions,
    ) -> Self {
        let parsed = ParsedDocument {
            document: Arc::new(asset.document),
            binary_chunk: asset.binary_chunk,
            source: source.map(Arc::new),
            base_directory: base_directory.into(),
        };
        SceneImporter::create(None, Some(Arc::new(parsed)), provider, options)
    }

    fn create(path: Option<String>, parsed: Option<Arc<ParsedDocument>>, provider: Arc<L>, options: ImportOptions) -> Self {
        Self {
            path,
            provider,
            scheduler: Arc::new(FrameScheduler::new(
                options.frame_budget(),
                options.overrun_report_threshold(),
            )),
            graph: Arc::new(RwLock::new(SceneGraph::new())),
            global_textures: GlobalTextureCache::global(),
            disposer: Arc::new(ImmediateDisposer::default()),
            cancel: None,
            tracker: StateTracker::new(options.verbose),
            busy: Mutex::new(false),
            parsed: Mutex::new(parsed),
            session: Mutex::new(None),
            retired: Mutex::new(vec![]),
            last_stats: Mutex::new(ImportStats::default()),
            options,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<FrameScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Imports into an existing scene graph instead of a fresh one.
    pub fn with_scene_graph(mut self, graph: Arc<RwLock<SceneGraph>>) -> Self {
        self.graph = graph;
        self
    }

    /// Shares textures through `cache` instead of the process wide one.
    pub fn with_texture_cache(mut self, cache: Arc<GlobalTextureCache>) -> Self {
        self.global_textures = cache;
        self
    }

    pub fn with_disposer(mut self, disposer: Arc<dyn ObjectDisposer>) -> Self {
        self.disposer = disposer;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> ImportState {
        self.tracker.state()
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.lock().expect("Importer Busy Lock")
    }

    pub fn scene_graph(&self) -> &Arc<RwLock<SceneGraph>> {
        &self.graph
    }

    pub fn scheduler(&self) -> &Arc<FrameScheduler> {
        &self.scheduler
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Stats of the running (or last failed) session, else of the last completed one.
    pub fn stats(&self) -> ImportStats {
        let session = self.session.lock().expect("Import Session Lock").clone();
        match session {
            Some(session) => self.stats_of(&session.cache),
            None => self.last_stats.lock().expect("Import Stats Lock").clone(),
        }
    }

    fn stats_of(&self, cache: &AssetCache) -> ImportStats {
        ImportStats {
            builds: cache.build_counts(),
            decodes: cache.decodes(),
            color_space_conflicts: cache.color_space_conflicts(),
            stage_timings: self.tracker.timings(),
        }
    }

    /// Loads `scene` (or the document's default scene) under a new root object and returns that root.
    pub async fn load_scene(&self, scene: Option<usize>) -> Result<SceneObjectId, ImportError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let result = self.import_scene(scene).await;
        self.finish(result)
    }

    /// [`SceneImporter::load_scene`], reporting through `callback` instead. The callback runs exactly once.
    pub async fn load_scene_with(
        &self,
        scene: Option<usize>,
        callback: impl FnOnce(Option<SceneObjectId>, Option<ImportError>),
    ) {
        match self.load_scene(scene).await {
            Ok(root) => callback(Some(root), None),
            Err(err) => callback(None, Some(err)),
        }
    }

    /// Loads a single node and its subtree, without a scene root.
    pub async fn load_node(&self, node: usize) -> Result<SceneObjectId, ImportError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let result = self.import_node(node).await;
        self.finish(result)
    }

    pub async fn load_node_with(
        &self,
        node: usize,
        callback: impl FnOnce(Option<SceneObjectId>, Option<ImportError>),
    ) {
        match self.load_node(node).await {
            Ok(object) => callback(Some(object), None),
            Err(err) => callback(None, Some(err)),
        }
    }

    /// Builds one material and its textures. The material stays owned by the running session: it is handed
    /// to the next scene or node that gets instantiated, or released on [`SceneImporter::dispose`].
    pub async fn load_material(&self, material: usize) -> Result<Arc<RenderMaterial>, ImportError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let result = async {
            let session = self.session().await?;
            let ctx = self.context(&session);
            ctx.enter(ImportState::BuildingMaterialsTextures);
            Ok(ctx.material(material).await?.material.clone())
        }
        .await;

        match result {
            Ok(material) => {
                self.settle_session();
                self.tracker.enter(ImportState::Complete);
                Ok(material)
            }
            Err(err) => {
                error!("Loading material {} failed: {}", material, err);
                self.tracker.enter(ImportState::Failed);
                Err(err)
            }
        }
    }

    /// Drops the running session and the parsed document, handing every stream back to the provider.
    /// Renderables that were already instantiated stay alive with their objects. Returns the number of
    /// streams the provider pooled.
    pub fn dispose(&self) -> Result<usize, ImportError> {
        let _busy = BusyGuard::acquire(&self.busy)?;

        let mut pooled = 0;
        if let Some(session) = self.session.lock().expect("Import Session Lock").take() {
            pooled += session.cache.dispose(&*self.provider);
        }
        let retired = std::mem::take(&mut *self.retired.lock().expect("Retired Sessions Lock"));
        if !retired.is_empty() {
            debug!("Releasing {} abandoned sessions", retired.len());
        }
        drop(retired);
        if let Some(parsed) = self.parsed.lock().expect("Parsed Document Lock").take()
            && let Ok(parsed) = Arc::try_unwrap(parsed)
            && let Some(source) = parsed.source
            && let Ok(source) = Arc::try_unwrap(source)
            && self.provider.give_back(source)
        {
            pooled += 1;
        }

        self.tracker.enter(ImportState::Idle);
        debug!("Importer disposed, {} streams pooled", pooled);
        Ok(pooled)
    }

    fn finish(&self, result: Result<SceneObjectId, ImportError>) -> Result<SceneObjectId, ImportError> {
        match &result {
            Ok(object) => {
                self.hand_off_session();
                self.tracker.enter(ImportState::Complete);
                info!("Import complete, top level object {:?}", object);
            }
            Err(err) => {
                error!("Import failed: {}", err);
                self.tracker.enter(ImportState::Failed);
            }
        }
        result
    }

    /// The instantiated objects own the renderables now, what is left in the session are streams and
    /// definitions.
    fn hand_off_session(&self) {
        let Some(session) = self.session.lock().expect("Import Session Lock").take() else {
            return;
        };

        let cache = &session.cache;
        cache.textures.iter().for_each(|texture| texture.clear_definition());
        cache.materials.iter().for_each(|material| material.clear_definition());
        cache.meshes.iter().for_each(|mesh| mesh.clear_attributes());

        *self.last_stats.lock().expect("Import Stats Lock") = self.stats_of(cache);
        let pooled = cache.dispose(&*self.provider);
        trace!("Session handed off, {} streams pooled", pooled);
    }

    async fn parsed_document(&self) -> Result<Arc<ParsedDocument>, ImportError> {
        if let Some(parsed) = self.parsed.lock().expect("Parsed Document Lock").clone() {
            return Ok(parsed);
        }

        self.tracker.enter(ImportState::Parsing);
        let path = self
            .path
            .clone()
            .ok_or_else(|| ImportError::malformed("importer has neither a path nor a document"))?;
        let stream = self.provider.load_stream(&path).await?;
        let asset = GltfReader::parse_asset(&stream)?;

        for required in &asset.document.extensions_required {
            if ExtensionKind::from_name(required).is_none() {
                warn!("{} requires {}, which is not supported", path, required);
            }
        }
        info!(
            "Parsed {}: {} nodes, {} meshes, {} materials, {} images",
            path,
            asset.document.nodes.len(),
            asset.document.meshes.len(),
            asset.document.materials.len(),
            asset.document.images.len()
        );

        let source = match asset.binary_chunk {
            Some(_) => Some(Arc::new(stream)),
            None => {
                self.provider.give_back(stream);
                None
            }
        };
        let parsed = Arc::new(ParsedDocument {
            document: Arc::new(asset.document),
            binary_chunk: asset.binary_chunk,
            source,
            base_directory: parent_directory(&path).to_string(),
        });

        *self.parsed.lock().expect("Parsed Document Lock") = Some(parsed.clone());
        Ok(parsed)
    }

    fn settle_session(&self) {
        if let Some(session) = self.session.lock().expect("Import Session Lock").as_ref() {
            session.settled.store(true, Ordering::Release);
        }
    }

    /// Gives the streams of an abandoned session back and keeps its record with the importer.
    fn retire_session(&self, session: Arc<ImportSession>) {
        self.session.lock().expect("Import Session Lock").take();
        let pooled = session.cache.dispose(&*self.provider);
        warn!("Discarding the session of an unfinished load, {} streams pooled", pooled);
        self.retired
            .lock()
            .expect("Retired Sessions Lock")
            .push(session.record.clone());
    }

    /// The running session, or a fresh one for the parsed document. The session returned is unsettled until
    /// the load using it succeeds.
    async fn session(&self) -> Result<Arc<ImportSession>, ImportError> {
        let current = self.session.lock().expect("Import Session Lock").clone();
        if let Some(session) = current {
            if session.settled.swap(false, Ordering::AcqRel) {
                return Ok(session);
            }
            self.retire_session(session);
        }

        let parsed = self.parsed_document().await?;
        let session = Arc::new(ImportSession {
            cache: AssetCache::new(&parsed.document, parsed.source.clone()),
            document: parsed.document.clone(),
            base_directory: parsed.base_directory.clone(),
            binary_chunk: parsed.binary_chunk.clone(),
            record: Arc::new(RefCountedCacheData::new(
                self.global_textures.clone(),
                self.disposer.clone(),
            )),
            settled: AtomicBool::new(false),
        });

        *self.session.lock().expect("Import Session Lock") = Some(session.clone());
        Ok(session)
    }

    fn context<'a>(&'a self, session: &'a ImportSession) -> ImportContext<'a, L> {
        ImportContext {
            session,
            provider: &self.provider,
            options: &self.options,
            scheduler: &self.scheduler,
            graph: &self.graph,
            global_textures: &self.global_textures,
            disposer: &self.disposer,
            cancel: self.cancel.as_ref(),
            state: &self.tracker,
        }
    }

    /// Builds buffers, meshes and materials of everything below `roots` ahead of the nodes, one kind after the
    /// other.
    async fn build_dependencies(&self, ctx: &ImportContext<'_, L>, roots: &[usize]) -> Result<(), ImportError> {
        let document = ctx.document();
        let nodes = NodeImporter::reachable_nodes(document, roots)?;
        let meshes = nodes
            .iter()
            .filter_map(|&node| document.nodes[node].mesh)
            .unique()
            .collect_vec();

        ctx.enter(ImportState::BuildingBuffers);
        for &mesh in &meshes {
            let primitives = document.meshes[check_range(AssetKind::Mesh, mesh, document.meshes.len())?]
                .primitives
                .len();
            for primitive in 0..primitives {
                ctx.primitive_accessors(mesh, primitive).await?;
            }
        }

        ctx.enter(ImportState::BuildingMeshes);
        for &mesh in &meshes {
            ctx.mesh_primitives(mesh).await?;
        }

        ctx.enter(ImportState::BuildingMaterialsTextures);
        for &mesh in &meshes {
            for primitive in &document.meshes[mesh].primitives {
                ctx.primitive_material(primitive.material).await?;
            }
        }
        Ok(())
    }

    async fn import_scene(&self, scene: Option<usize>) -> Result<SceneObjectId, ImportError> {
        let session = self.session().await?;
        let ctx = self.context(&session);
        let document = ctx.document();

        let index = scene.unwrap_or_else(|| document.default_scene_index());
        let scene = &document.scenes[check_range(AssetKind::Scene, index, document.scenes.len())?];
        self.build_dependencies(&ctx, &scene.nodes).await?;

        ctx.enter(ImportState::BuildingNodes);
        let name = scene.name.clone().unwrap_or_else(|| DEFAULT_SCENE_NAME.to_string());
        let root = ctx.with_graph(|graph| {
            let root = graph.create(name);
            graph.set_active(root, false);
            root
        });
        for &node in &scene.nodes {
            let data = ctx.construct_node(node).await?;
            ctx.attach_object(data.attach_point(), root)?;
        }

        ctx.enter(ImportState::BuildingAnimations);
        let mut clips = Vec::with_capacity(document.animations.len());
        for animation in 0..document.animations.len() {
            clips.push(ctx.animation_clip(animation, root).await?.clip.clone());
        }

        let show = self.options.show_scene_object;
        let record = session.record.clone();
        ctx.with_graph(|graph| {
            if let Some(object) = graph.get_mut(root) {
                if !clips.is_empty() {
                    object.animation = Some(AnimationComponent {
                        clips,
                        default_clip: Some(0),
                    });
                }
                object.instantiated = Some(InstantiatedGltfObject(record));
            }
            graph.set_active(root, show);
        });
        Ok(root)
    }

    async fn import_node(&self, node: usize) -> Result<SceneObjectId, ImportError> {
        let session = self.session().await?;
        let ctx = self.context(&session);
        check_range(AssetKind::Node, node, ctx.document().nodes.len())?;
        self.build_dependencies(&ctx, &[node]).await?;

        ctx.enter(ImportState::BuildingNodes);
        let object = ctx.construct_node(node).await?.attach_point();

        let record = session.record.clone();
        ctx.with_graph(|graph| {
            if let Some(top) = graph.get_mut(object) {
                top.instantiated = Some(InstantiatedGltfObject(record));
            }
            graph.set_active(object, true);
        });
        Ok(object)
    }
}
