use std::collections::HashMap;
use std::sync::Arc;

use gltfstream_files::common::types::DecodedImage;
use gltfstream_files::gltf::types::{
    Document, FILTER_LINEAR, FILTER_NEAREST, WRAP_CLAMP_TO_EDGE, WRAP_MIRRORED_REPEAT,
};
use itertools::Itertools;
use log::{debug, trace, warn};
use tokio::task::JoinSet;

use crate::error::{AssetKind, ImportError, check_range};
use crate::io::common::loader::{Stream, StreamProvider};
use crate::io::common::uri::{is_data_uri, resolve_uri};
use crate::rendering::asset_graph::cache_data::{ImageCacheData, ImageStream, TextureCacheData};
use crate::rendering::asset_graph::disposer::DisposableObject;
use crate::rendering::common::types::{FilterMode, RenderTexture, SamplerState, Texture, WrapMode};
use crate::rendering::importer::context::ImportContext;
use crate::rendering::loader::texture_loader::{TextureLoadSettings, TextureLoader};

pub struct TextureImporter {}

impl TextureImporter {
    pub fn filter_mode(mag_filter: Option<u32>) -> FilterMode {
        match mag_filter {
            Some(FILTER_NEAREST) => FilterMode::Point,
            Some(FILTER_LINEAR) => FilterMode::Bilinear,
            _ => FilterMode::Trilinear,
        }
    }

    pub fn wrap_mode(wrap: u32) -> WrapMode {
        match wrap {
            WRAP_CLAMP_TO_EDGE => WrapMode::Clamp,
            WRAP_MIRRORED_REPEAT => WrapMode::Mirror,
            _ => WrapMode::Repeat,
        }
    }

    pub fn sampler_state(document: &Document, sampler: Option<usize>) -> Result<SamplerState, ImportError> {
        let Some(sampler) = sampler else {
            return Ok(SamplerState::default());
        };

        let sampler = &document.samplers[check_range(AssetKind::Sampler, sampler, document.samplers.len())?];
        Ok(SamplerState {
            filter: TextureImporter::filter_mode(sampler.mag_filter),
            wrap_u: TextureImporter::wrap_mode(sampler.wrap_s),
            wrap_v: TextureImporter::wrap_mode(sampler.wrap_t),
        })
    }

    /// The global texture cache key of an image: its resolved path. Embedded images have none, they are
    /// never shared between imports.
    pub fn image_key(document: &Document, base_directory: &str, image: usize) -> Option<String> {
        let uri = document.images.get(image)?.uri.as_deref()?;
        (!is_data_uri(uri)).then(|| resolve_uri(base_directory, uri))
    }

    fn color_space(linear: bool) -> &'static str {
        if linear { "linear" } else { "sRGB" }
    }

    pub fn image_label(document: &Document, image: usize) -> String {
        let definition = document.images.get(image);
        definition
            .and_then(|image| image.name.clone())
            .or_else(|| {
                definition
                    .and_then(|image| image.uri.as_deref())
                    .filter(|uri| !is_data_uri(uri))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("GLTFImage{}", image))
    }

    /// Images referenced by the given textures, each once.
    pub fn source_images(document: &Document, textures: &[usize]) -> Vec<usize> {
        textures
            .iter()
            .filter_map(|&texture| document.textures.get(texture)?.source)
            .unique()
            .collect_vec()
    }
}

impl<L: StreamProvider> ImportContext<'_, L> {
    pub async fn image_stream(&self, index: usize) -> Result<Arc<ImageStream>, ImportError> {
        self.cache()
            .image_streams
            .get_or_build(index, move || async move {
                let definition = &self.document().images[index];

                if let Some(key) = TextureImporter::image_key(self.document(), &self.session.base_directory, index)
                    && let Some(handle) = self.global_textures.get(&key)
                {
                    trace!("{} is already decoded, sharing it", key);
                    self.session.record.add_shared_texture(handle.clone());
                    return Ok(ImageStream::Cached(handle));
                }

                match (&definition.uri, definition.buffer_view) {
                    (Some(uri), _) => match self.load_uri(uri).await {
                        Ok(stream) => Ok(ImageStream::Bytes(stream)),
                        Err(ImportError::Load(err)) => {
                            warn!("Image {} could not be loaded: {}", index, err);
                            Ok(ImageStream::Missing)
                        }
                        Err(err) => Err(err),
                    },
                    (None, Some(view)) => self.image_stream_from_view(view).await,
                    (None, None) => {
                        warn!("Image {} has neither a uri nor a buffer view", index);
                        Ok(ImageStream::Missing)
                    }
                }
            })
            .await
    }

    async fn image_stream_from_view(&self, view: usize) -> Result<ImageStream, ImportError> {
        let document = self.document();
        let definition = &document.buffer_views[check_range(AssetKind::BufferView, view, document.buffer_views.len())?];
        let buffer = self.buffer(definition.buffer).await?;

        let end = definition.byte_offset + definition.byte_length;
        if end > buffer.byte_length {
            return Err(ImportError::malformed(format!(
                "buffer view {} reads past the end of buffer {}",
                view, definition.buffer
            )));
        }
        Ok(ImageStream::Bytes(Stream::new(
            buffer.bytes()[definition.byte_offset..end].to_vec(),
        )))
    }

    /// Fetches the payloads of external images concurrently on the runtime. Embedded and buffer view images
    /// are left to [`ImportContext::image_stream`], reading them costs no I/O.
    pub async fn prefetch_image_streams(&self, images: &[usize]) -> Result<(), ImportError> {
        let table = &self.cache().image_streams;
        let mut writers = HashMap::new();
        let mut fetches = JoinSet::new();

        for &index in images {
            if table.slot(index)?.is_populated() || writers.contains_key(&index) {
                continue;
            }
            let Some(key) = TextureImporter::image_key(self.document(), &self.session.base_directory, index) else {
                continue;
            };

            let writer = table.begin(index)?;
            if let Some(handle) = self.global_textures.get(&key) {
                self.session.record.add_shared_texture(handle.clone());
                writer.publish(ImageStream::Cached(handle));
                continue;
            }

            let provider = self.provider.clone();
            fetches.spawn(async move {
                let result = provider.load_stream(&key).await;
                (index, key, result)
            });
            writers.insert(index, writer);
        }

        debug!("Prefetching {} images", writers.len());
        while let Some(joined) = fetches.join_next().await {
            let (index, key, result) = joined?;
            let stream = match result {
                Ok(stream) => ImageStream::Bytes(stream),
                Err(err) => {
                    warn!("Image {} ({}) could not be loaded: {}", index, key, err);
                    ImageStream::Missing
                }
            };
            if let Some(writer) = writers.remove(&index) {
                writer.publish(stream);
            }
        }

        self.checkpoint("image prefetch").await
    }

    pub async fn image(&self, index: usize, linear: bool) -> Result<Arc<ImageCacheData>, ImportError> {
        self.cache()
            .images
            .get_or_build(index, move || async move {
                let stream = self.image_stream(index).await?;
                let key = TextureImporter::image_key(self.document(), &self.session.base_directory, index);

                match &*stream {
                    ImageStream::Missing => Ok(ImageCacheData {
                        texture: None,
                        shared_key: None,
                    }),
                    ImageStream::Cached(handle) => Ok(ImageCacheData {
                        texture: Some(handle.clone()),
                        shared_key: key,
                    }),
                    ImageStream::Bytes(_) => self.decode_image(index, stream.clone(), key, linear).await,
                }
            })
            .await
    }

    async fn decode_image(
        &self,
        index: usize,
        stream: Arc<ImageStream>,
        key: Option<String>,
        linear: bool,
    ) -> Result<ImageCacheData, ImportError> {
        // concurrent imports of the same path queue up here, only the first one decodes
        let _gate = match &key {
            Some(key) => Some(self.global_textures.decode_gate().acquire(key).await),
            None => None,
        };

        if let Some(key) = &key
            && let Some(handle) = self.global_textures.get(key)
        {
            debug!("{} was decoded by another import in the meantime", key);
            self.session.record.add_shared_texture(handle.clone());
            return Ok(ImageCacheData {
                texture: Some(handle),
                shared_key: Some(key.clone()),
            });
        }

        let label = TextureImporter::image_label(self.document(), index);
        let decoded = match self.run_decoder(stream, label.clone()).await {
            Ok(decoded) => decoded,
            Err(err) if !err.is_fatal() => {
                warn!("Image {} stays empty: {}", label, err);
                return Ok(ImageCacheData {
                    texture: None,
                    shared_key: None,
                });
            }
            Err(err) => return Err(err),
        };
        self.cache().record_decode();

        let handle = Arc::new(Texture::new(
            label,
            decoded,
            linear,
            self.options.keep_cpu_copy_of_texture,
        ));
        self.checkpoint("texture upload").await?;

        match key {
            Some(key) => {
                let winner = self.global_textures.add(&key, handle.clone());
                if !Arc::ptr_eq(&winner, &handle) {
                    self.disposer.dispose(DisposableObject::Texture(handle));
                }
                self.session.record.add_shared_texture(winner.clone());
                Ok(ImageCacheData {
                    texture: Some(winner),
                    shared_key: Some(key),
                })
            }
            None => {
                self.session.record.add_owned_texture(handle.clone());
                Ok(ImageCacheData {
                    texture: Some(handle),
                    shared_key: None,
                })
            }
        }
    }

    async fn run_decoder(&self, stream: Arc<ImageStream>, label: String) -> Result<DecodedImage, ImportError> {
        let settings = TextureLoadSettings::from(self.options);
        let decode = move || match &*stream {
            ImageStream::Bytes(bytes) => TextureLoader::decode(bytes, &label, &settings),
            _ => Err(ImportError::DecodeFailure {
                label,
                reason: "no payload".to_string(),
            }),
        };

        let decoded = if self.options.multithreaded {
            tokio::task::spawn_blocking(decode).await?
        } else {
            decode()
        };
        self.checkpoint("texture decode").await?;
        decoded
    }

    /// Textures and their images are built once, with the color space of the first request. Later requests
    /// that disagree get the same texture and are counted as conflicts.
    pub async fn texture(&self, index: usize, linear: bool) -> Result<Arc<TextureCacheData>, ImportError> {
        let texture = self.build_texture(index, linear).await?;
        if let Some(render) = &texture.texture
            && render.image.is_linear() != linear
        {
            warn!(
                "Texture {} ({}) was built as {}, it is also used as {}",
                index,
                render.image.label(),
                TextureImporter::color_space(render.image.is_linear()),
                TextureImporter::color_space(linear)
            );
            self.cache().record_color_space_conflict();
        }
        Ok(texture)
    }

    async fn build_texture(&self, index: usize, linear: bool) -> Result<Arc<TextureCacheData>, ImportError> {
        self.cache()
            .textures
            .get_or_build(index, move || async move {
                let definition = self.document().textures[index].clone();
                let sampler = TextureImporter::sampler_state(self.document(), definition.sampler)?;

                let (texture, auto_destroy) = match definition.source {
                    Some(source) => {
                        let image = self.image(source, linear).await?;
                        let texture = image.texture.clone().map(|image| RenderTexture { image, sampler });
                        (texture, !image.is_shared())
                    }
                    None => {
                        warn!("Texture {} has no source image", index);
                        (None, true)
                    }
                };
                Ok(TextureCacheData::new(definition, texture, auto_destroy))
            })
            .await
    }
}
