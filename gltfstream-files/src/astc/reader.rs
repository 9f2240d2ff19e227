use std::io::{Cursor, Read};

use crate::ParserError;
use crate::astc::types::{ASTC_HEADER_SIZE, ASTC_MAGIC, AstcHeader};
use crate::common::reader::{Parseable, ensure_len};
use crate::common::types::{AstcBlock, DecodedImage, TextureFormat};

pub struct AstcReader {}

impl AstcReader {
    pub fn parse_header<R: Read>(rdr: &mut R) -> Result<AstcHeader, ParserError> {
        let header = AstcHeader::parse(rdr)?;
        if header.magic != ASTC_MAGIC {
            return Err(ParserError::InvalidMagicValue { magic: header.magic });
        }

        Ok(header)
    }

    /// The payload already is renderer-ready, so it is passed on verbatim after the header.
    pub fn decode(bytes: &[u8]) -> Result<DecodedImage, ParserError> {
        ensure_len(bytes, ASTC_HEADER_SIZE)?;
        let header = AstcReader::parse_header(&mut Cursor::new(bytes))?;

        if header.block_z > 1 || header.depth() > 1 {
            return Err(ParserError::UnsupportedBlockFootprint {
                x: header.block_x,
                y: header.block_y,
                z: header.block_z,
            });
        }

        let block = AstcBlock::from_footprint(header.block_x, header.block_y).ok_or(
            ParserError::UnsupportedBlockFootprint {
                x: header.block_x,
                y: header.block_y,
                z: header.block_z,
            },
        )?;

        let format = TextureFormat::Astc(block);
        let (width, height) = (header.width(), header.height());
        if width == 0 || height == 0 {
            return Err(ParserError::FormatError {
                reason: "ASTC dimensions MUST NOT be zero",
            });
        }
        ensure_len(bytes, ASTC_HEADER_SIZE + format.level_size(width, height))?;

        Ok(DecodedImage {
            width,
            height,
            mip_count: 1,
            format,
            data: bytes[ASTC_HEADER_SIZE..].to_vec(),
        })
    }
}
