use std::io::Cursor;

use gltfstream_files_derive_parseable::Parse;

use crate::ParserError;
use crate::common::reader::{Parseable, ensure_len};
use crate::gltf::types::{Document, FOURCC_GLB, GLB_CHUNK_BIN, GLB_CHUNK_JSON, GLB_HEADER_SIZE, GltfAsset};

#[derive(Debug, Copy, Clone, Parse)]
pub struct GlbHeader {
    pub magic: u32,
    pub version: u32,
    pub length: u32,
}

#[derive(Debug, Copy, Clone, Parse)]
pub struct GlbChunkHeader {
    pub length: u32,
    pub chunk_type: u32,
}

pub struct GltfReader {}

impl GltfReader {
    pub fn is_glb(bytes: &[u8]) -> bool {
        bytes.len() >= 4 && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == FOURCC_GLB
    }

    /// Accepts either a JSON document or a binary container.
    pub fn parse_asset(bytes: &[u8]) -> Result<GltfAsset, ParserError> {
        if bytes.is_empty() {
            return Err(ParserError::EmptySource);
        }

        if GltfReader::is_glb(bytes) {
            return GltfReader::parse_glb(bytes);
        }

        Ok(GltfAsset {
            document: serde_json::from_slice::<Document>(bytes)?,
            binary_chunk: None,
        })
    }

    pub fn parse_glb(bytes: &[u8]) -> Result<GltfAsset, ParserError> {
        ensure_len(bytes, GLB_HEADER_SIZE)?;
        let mut rdr = Cursor::new(bytes);
        let header = GlbHeader::parse(&mut rdr)?;
        if header.magic != FOURCC_GLB {
            return Err(ParserError::InvalidMagicValue { magic: header.magic });
        }

        if header.version != 2 {
            return Err(ParserError::FormatError {
                reason: "GLB version MUST BE 2",
            });
        }

        let total = (header.length as usize).min(bytes.len());
        let mut json = None;
        let mut binary_chunk = None;
        while (rdr.position() as usize) + 8 <= total {
            let chunk = GlbChunkHeader::parse(&mut rdr)?;
            let start = rdr.position() as usize;
            let end = start + chunk.length as usize;
            ensure_len(&bytes[..total], end)?;

            match chunk.chunk_type {
                GLB_CHUNK_JSON if json.is_none() => json = Some(&bytes[start..end]),
                GLB_CHUNK_BIN if binary_chunk.is_none() => binary_chunk = Some(start..end),
                // unknown chunks MUST be ignored
                _ => {}
            }

            // chunks are 4 byte aligned
            rdr.set_position(end.next_multiple_of(4) as u64);
        }

        let json = json.ok_or(ParserError::FormatError {
            reason: "GLB is missing its JSON chunk",
        })?;

        Ok(GltfAsset {
            document: serde_json::from_slice::<Document>(json)?,
            binary_chunk,
        })
    }
}
