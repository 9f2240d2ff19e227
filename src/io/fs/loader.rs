use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::trace;

use crate::io::common::loader::{LoadError, Stream, StreamProvider};

pub struct FileLoader {
    root_directory: PathBuf,
}

impl FileLoader {
    pub fn new(root_directory: impl Into<PathBuf>) -> Self {
        Self {
            root_directory: root_directory.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_directory.join(path)
        }
    }

    fn map_error(full_path: &Path, error: std::io::Error) -> LoadError {
        let path = full_path.to_string_lossy().to_string();
        if error.kind() == ErrorKind::NotFound {
            LoadError::NotFound { path }
        } else {
            LoadError::Io { path, source: error }
        }
    }
}

impl StreamProvider for FileLoader {
    async fn load_stream(&self, path: &str) -> Result<Stream, LoadError> {
        let full_path = self.full_path(path);
        trace!("Reading {}", full_path.display());
        tokio::fs::read(&full_path)
            .await
            .map(Stream::new)
            .map_err(|error| FileLoader::map_error(&full_path, error))
    }

    fn has_sync_load(&self) -> bool {
        true
    }

    fn load_stream_sync(&self, path: &str) -> Result<Stream, LoadError> {
        let full_path = self.full_path(path);
        std::fs::read(&full_path)
            .map(Stream::new)
            .map_err(|error| FileLoader::map_error(&full_path, error))
    }

    fn give_back(&self, stream: Stream) -> bool {
        // file reads are never pooled
        drop(stream);
        false
    }

    fn clear(&self) {}
}
