use std::time::Duration;

use log::warn;

use crate::io::common::loader::{LoadError, Stream, StreamProvider};

pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds the asynchronous stream acquisition of another provider. Sync loads are passed through untouched.
pub struct TimeoutLoader<L: StreamProvider> {
    inner: L,
    timeout: Duration,
}

impl<L: StreamProvider> TimeoutLoader<L> {
    pub fn new(inner: L, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: StreamProvider> StreamProvider for TimeoutLoader<L> {
    async fn load_stream(&self, path: &str) -> Result<Stream, LoadError> {
        match tokio::time::timeout(self.timeout, self.inner.load_stream(path)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Connection timeout while loading {}", path);
                Err(LoadError::Timeout {
                    path: path.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    fn has_sync_load(&self) -> bool {
        self.inner.has_sync_load()
    }

    fn load_stream_sync(&self, path: &str) -> Result<Stream, LoadError> {
        self.inner.load_stream_sync(path)
    }

    fn give_back(&self, stream: Stream) -> bool {
        self.inner.give_back(stream)
    }

    fn clear(&self) {
        self.inner.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::loader::MemoryLoader;

    struct NeverLoader;

    impl StreamProvider for NeverLoader {
        async fn load_stream(&self, _path: &str) -> Result<Stream, LoadError> {
            std::future::pending().await
        }

        fn give_back(&self, _stream: Stream) -> bool {
            false
        }

        fn clear(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let loader = TimeoutLoader::new(NeverLoader, DEFAULT_STREAM_TIMEOUT);
        let result = loader.load_stream("slow.bin").await;
        assert!(matches!(result, Err(LoadError::Timeout { after, .. }) if after == DEFAULT_STREAM_TIMEOUT));
    }

    #[tokio::test]
    async fn passes_through() -> Result<(), anyhow::Error> {
        let memory = MemoryLoader::new();
        memory.insert("a.bin", vec![9u8]);
        let loader = TimeoutLoader::new(memory, Duration::from_secs(1));

        let stream = loader.load_stream("a.bin").await?;
        assert!(loader.give_back(stream));
        assert_eq!(loader.inner().pooled_buffers(), 1);
        Ok(())
    }
}
