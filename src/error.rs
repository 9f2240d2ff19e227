use std::fmt::{Display, Formatter};

use gltfstream_files::ParserError;
use thiserror::Error;

use crate::io::common::loader::LoadError;

/// The kinds of per-import cache slots, also used to name document collections in errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Buffer,
    BufferView,
    Accessor,
    ImageStream,
    Image,
    Sampler,
    Texture,
    Material,
    Mesh,
    Primitive,
    Node,
    Skin,
    Scene,
    Animation,
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssetKind::Buffer => "buffer",
            AssetKind::BufferView => "buffer view",
            AssetKind::Accessor => "accessor",
            AssetKind::ImageStream => "image stream",
            AssetKind::Image => "image",
            AssetKind::Sampler => "sampler",
            AssetKind::Texture => "texture",
            AssetKind::Material => "material",
            AssetKind::Mesh => "mesh",
            AssetKind::Primitive => "primitive",
            AssetKind::Node => "node",
            AssetKind::Skin => "skin",
            AssetKind::Scene => "scene",
            AssetKind::Animation => "animation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The document or one of its binary containers could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error("The document is malformed: {reason}")]
    MalformedDocument { reason: String },

    /// Recognized, but not representable (e.g. a primitive mode other than triangles).
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("{kind} {index} is out of range, the document has {count}")]
    Range { kind: AssetKind, index: usize, count: usize },

    #[error("The importer is busy with another load operation")]
    Concurrency,

    #[error("{kind} {index} is already being constructed")]
    Reentrant { kind: AssetKind, index: usize },

    #[error("Decoding {label} failed: {reason}")]
    DecodeFailure { label: String, reason: String },

    #[error(transparent)]
    Worker(#[from] tokio::task::JoinError),

    #[error("The import has been cancelled")]
    Cancelled,
}

impl ImportError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ImportError::MalformedDocument { reason: reason.into() }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        ImportError::UnsupportedFormat { reason: reason.into() }
    }

    /// Whether the error has to abort the whole import. Everything else only costs the asset it happened in.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ImportError::UnsupportedFormat { .. } | ImportError::DecodeFailure { .. }
        )
    }
}

/// Checks a document reference against the size of the collection it points into.
pub fn check_range(kind: AssetKind, index: usize, count: usize) -> Result<usize, ImportError> {
    if index < count {
        Ok(index)
    } else {
        Err(ImportError::Range { kind, index, count })
    }
}
