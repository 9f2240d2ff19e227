use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{path} could not be found")]
    NotFound { path: String },

    #[error("Reading {path} failed: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("Connection timeout after {after:?} while loading {path}")]
    Timeout { path: String, after: Duration },

    #[error("This stream provider has no synchronous load method")]
    SyncUnsupported,
}

/// An owned byte stream handed out by a [`StreamProvider`]. Providers that pool their buffers tag the streams
/// they create, so that [`StreamProvider::give_back`] can recognize them.
pub struct Stream {
    bytes: Vec<u8>,
    pool_tag: Option<u64>,
}

impl Stream {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pool_tag: None }
    }

    pub(crate) fn pooled(bytes: Vec<u8>, tag: u64) -> Self {
        Self {
            bytes,
            pool_tag: Some(tag),
        }
    }

    pub fn pool_tag(&self) -> Option<u64> {
        self.pool_tag
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Deref for Stream {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl Debug for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stream {{ bytes: [{}], pool_tag: {:?} }}", self.bytes.len(), self.pool_tag)
    }
}

/// Supplies byte streams for resolved paths. The importer only ever talks to this contract, the concrete
/// providers (filesystem, memory, network) are interchangeable.
pub trait StreamProvider: Send + Sync + 'static {
    fn load_stream(&self, path: &str) -> impl Future<Output = Result<Stream, LoadError>> + Send;

    fn has_sync_load(&self) -> bool {
        false
    }

    fn load_stream_sync(&self, path: &str) -> Result<Stream, LoadError> {
        let _ = path;
        Err(LoadError::SyncUnsupported)
    }

    /// Returns whether the stream was pooled for reuse.
    fn give_back(&self, stream: Stream) -> bool;

    /// Drops all pooled buffers.
    fn clear(&self);
}
