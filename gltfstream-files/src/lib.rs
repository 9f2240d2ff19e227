use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("The file's magic value does not match the expectation {magic:#x}")]
    InvalidMagicValue { magic: u32 },

    #[error("The file is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    /// The container is well-formed, but its pixel format has no mapping in our format table.
    #[error("Unsupported pixel format {format:#x}")]
    UnsupportedPixelFormat { format: u32 },

    #[error("Unsupported ASTC block footprint {x}x{y}x{z}")]
    UnsupportedBlockFootprint { x: u8, y: u8, z: u8 },

    #[error("Expected at least {expected} bytes, but only {actual} are available")]
    TruncatedData { expected: usize, actual: usize },

    /// Represents an empty source, e.g. a zero-length image payload.
    #[error("Source contains no data")]
    EmptySource,

    #[error("Extension {name} could not be decoded: {source}")]
    InvalidExtension {
        name: &'static str,
        source: serde_json::Error,
    },

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

impl ParserError {
    /// Whether the container itself was recognized and only its internal format could not be mapped.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(
            self,
            ParserError::UnsupportedPixelFormat { .. } | ParserError::UnsupportedBlockFootprint { .. }
        )
    }
}

pub mod astc;
pub mod basis;
pub mod bcn;
pub mod common;
pub mod dds;
pub mod gltf;
pub mod ktx;
