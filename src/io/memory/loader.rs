use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::trace;

use crate::io::common::loader::{LoadError, Stream, StreamProvider};
use crate::io::common::uri::resolve_uri;

#[derive(Default)]
struct StreamPool {
    free: Vec<Vec<u8>>,
    /// Tags of the streams handed out since the last `clear`. Streams that are dropped instead of given back
    /// stay in here until then.
    handed_out: HashSet<u64>,
}

/// Serves registered byte blobs, copying them into pooled buffers. Streams that are given back are recycled
/// for the next request.
#[derive(Default)]
pub struct MemoryLoader {
    files: DashMap<String, Arc<[u8]>>,
    loads: DashMap<String, usize>,
    pool: Mutex<StreamPool>,
    next_tag: AtomicU64,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &str) -> String {
        resolve_uri("", path)
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Arc<[u8]>>) {
        self.files.insert(MemoryLoader::key(path), bytes.into());
    }

    /// How often `path` has been requested so far.
    pub fn load_count(&self, path: &str) -> usize {
        self.loads.get(&MemoryLoader::key(path)).map(|c| *c).unwrap_or(0)
    }

    pub fn pooled_buffers(&self) -> usize {
        self.pool.lock().expect("Stream Pool Lock").free.len()
    }

    /// Streams handed out since the last clear that have not been given back.
    pub fn outstanding_streams(&self) -> usize {
        self.pool.lock().expect("Stream Pool Lock").handed_out.len()
    }

    fn copy_into_stream(&self, source: &[u8]) -> Stream {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let mut buffer = {
            let mut pool = self.pool.lock().expect("Stream Pool Lock");
            pool.handed_out.insert(tag);
            pool.free.pop().unwrap_or_default()
        };

        buffer.clear();
        buffer.extend_from_slice(source);
        Stream::pooled(buffer, tag)
    }

    fn load(&self, path: &str) -> Result<Stream, LoadError> {
        let key = MemoryLoader::key(path);
        *self.loads.entry(key.clone()).or_insert(0) += 1;

        let bytes = self
            .files
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(LoadError::NotFound { path: key })?;

        trace!("Serving {} bytes for {}", bytes.len(), path);
        Ok(self.copy_into_stream(&bytes))
    }
}

impl StreamProvider for MemoryLoader {
    async fn load_stream(&self, path: &str) -> Result<Stream, LoadError> {
        self.load(path)
    }

    fn has_sync_load(&self) -> bool {
        true
    }

    fn load_stream_sync(&self, path: &str) -> Result<Stream, LoadError> {
        self.load(path)
    }

    fn give_back(&self, stream: Stream) -> bool {
        let Some(tag) = stream.pool_tag() else {
            return false;
        };

        let mut pool = self.pool.lock().expect("Stream Pool Lock");
        if !pool.handed_out.remove(&tag) {
            return false;
        }

        pool.free.push(stream.into_bytes());
        true
    }

    fn clear(&self) {
        let mut pool = self.pool.lock().expect("Stream Pool Lock");
        pool.free.clear();
        pool.free.shrink_to_fit();
        // streams still out there are no longer accepted back
        pool.handed_out.clear();
        pool.handed_out.shrink_to_fit();
    }
}
