use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, trace, warn};

use crate::rendering::asset_graph::decode_gate::DecodeGate;
use crate::rendering::common::types::{TextureHandle, TextureId};

struct CacheEntry {
    handle: TextureHandle,
    ref_count: usize,
}

#[derive(Default)]
struct CacheMaps {
    by_key: HashMap<String, CacheEntry>,
    keys: HashMap<TextureId, String>,
}

/// Process-wide deduplication of decoded textures, keyed by their resolved source path.
///
/// A key is present exactly while its reference count is above zero, and both directions of the
/// key <-> handle lookup are only ever changed together, under one lock. That lock is never held
/// across I/O or decoding: imports that want to avoid decoding the same path twice go through the
/// per-path decode gate first and only then consult the cache.
pub struct GlobalTextureCache {
    maps: Mutex<CacheMaps>,
    gate: DecodeGate,
}

static GLOBAL: OnceLock<Arc<GlobalTextureCache>> = OnceLock::new();

impl GlobalTextureCache {
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(CacheMaps::default()),
            gate: DecodeGate::new(),
        }
    }

    /// The instance shared by every importer that has not been handed a cache of its own.
    pub fn global() -> Arc<GlobalTextureCache> {
        GLOBAL.get_or_init(|| Arc::new(GlobalTextureCache::new())).clone()
    }

    /// Returns the cached handle and takes a reference on it. Never creates an entry.
    pub fn get(&self, key: &str) -> Option<TextureHandle> {
        let mut maps = self.maps.lock().expect("Global Texture Cache Lock");
        let entry = maps.by_key.get_mut(key)?;
        entry.ref_count += 1;
        trace!("Global texture cache hit for {} ({} refs)", key, entry.ref_count);
        Some(entry.handle.clone())
    }

    /// Inserts `handle` with one reference, or, if another import has been faster, takes a reference on the
    /// existing handle and returns that instead. The caller has to destroy its own handle in that case.
    pub fn add(&self, key: &str, handle: TextureHandle) -> TextureHandle {
        let mut maps = self.maps.lock().expect("Global Texture Cache Lock");
        if let Some(entry) = maps.by_key.get_mut(key) {
            entry.ref_count += 1;
            debug!("Raced while adding {}, discarding texture {:?}", key, handle.id());
            return entry.handle.clone();
        }

        maps.keys.insert(handle.id(), key.to_string());
        maps.by_key.insert(
            key.to_string(),
            CacheEntry {
                handle: handle.clone(),
                ref_count: 1,
            },
        );
        handle
    }

    /// Drops one reference. The last reference removes the entry and destroys the texture, before returning.
    /// Returns whether the texture has been destroyed.
    pub fn remove_ref(&self, handle: &TextureHandle) -> bool {
        let removed = {
            let mut maps = self.maps.lock().expect("Global Texture Cache Lock");
            let Some(key) = maps.keys.get(&handle.id()).cloned() else {
                warn!("Releasing texture {:?} that is not in the global cache", handle.id());
                return false;
            };

            let Some(entry) = maps.by_key.get_mut(&key) else {
                warn!("Global texture cache lost the entry for {}", key);
                return false;
            };

            entry.ref_count -= 1;
            if entry.ref_count > 0 {
                return false;
            }

            maps.keys.remove(&handle.id());
            maps.by_key.remove(&key)
        };

        match removed {
            Some(entry) => {
                debug!("Last reference to {} released", entry.handle.label());
                entry.handle.destroy()
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.maps
            .lock()
            .expect("Global Texture Cache Lock")
            .by_key
            .contains_key(key)
    }

    pub fn reference_count(&self, key: &str) -> usize {
        self.maps
            .lock()
            .expect("Global Texture Cache Lock")
            .by_key
            .get(key)
            .map(|entry| entry.ref_count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.maps.lock().expect("Global Texture Cache Lock").by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn decode_gate(&self) -> &DecodeGate {
        &self.gate
    }
}

impl Default for GlobalTextureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::common::types::Texture;
    use gltfstream_files::common::types::{DecodedImage, TextureFormat};

    fn texture(label: &str) -> TextureHandle {
        let image = DecodedImage {
            width: 2,
            height: 2,
            mip_count: 1,
            format: TextureFormat::Rgba8,
            data: vec![255; 16],
        };
        Arc::new(Texture::new(label, image, false, false))
    }

    #[test]
    fn get_never_creates() {
        let cache = GlobalTextureCache::new();
        assert!(cache.get("missing.png").is_none());
        assert!(!cache.contains("missing.png"));
    }

    #[test]
    fn last_release_destroys() {
        let cache = GlobalTextureCache::new();
        let tex = cache.add("a.png", texture("a"));
        let again = cache.get("a.png").unwrap();
        assert!(Arc::ptr_eq(&tex, &again));
        assert_eq!(cache.reference_count("a.png"), 2);

        assert!(!cache.remove_ref(&tex));
        assert!(!tex.is_destroyed());
        assert!(cache.contains("a.png"));

        assert!(cache.remove_ref(&again));
        assert!(tex.is_destroyed());
        assert!(!cache.contains("a.png"));
        assert!(cache.is_empty());

        // the count can never go negative
        assert!(!cache.remove_ref(&tex));
    }

    #[test]
    fn raced_add_returns_the_existing_handle() {
        let cache = GlobalTextureCache::new();
        let first = cache.add("a.png", texture("first"));
        let second = texture("second");
        let winner = cache.add("a.png", second.clone());

        assert!(Arc::ptr_eq(&first, &winner));
        assert_eq!(cache.reference_count("a.png"), 2);
        // the discarded handle is unknown to the cache
        assert!(!cache.remove_ref(&second));
        assert_eq!(cache.reference_count("a.png"), 2);
    }
}
