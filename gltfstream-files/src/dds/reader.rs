use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;
use crate::common::reader::{Parseable, ensure_len};
use crate::common::types::{DecodedImage, TextureFormat};
use crate::dds::types::{
    DDS_FILE_HEADER_SIZE, DDS_MIN_SKIP_DIMENSION, DdsFlags, DdsHeader, DdsPixelFormatFlags, FOURCC_DDS, FOURCC_DXT1,
    FOURCC_DXT3, FOURCC_DXT5, MipSkip,
};

pub struct DdsReader {}

impl DdsReader {
    pub fn parse_header<R: Read>(rdr: &mut R) -> Result<DdsHeader, ParserError> {
        let magic = rdr.read_u32::<LittleEndian>()?;
        if magic != FOURCC_DDS {
            return Err(ParserError::InvalidMagicValue { magic });
        }

        let header = DdsHeader::parse(rdr)?;
        if header.size as usize != DDS_FILE_HEADER_SIZE - 4 {
            return Err(ParserError::FormatError {
                reason: "DDS header size MUST BE 124",
            });
        }

        Ok(header)
    }

    /// The pixel format block overrides the caller's default only for the DXT FourCCs we know.
    pub fn block_format(header: &DdsHeader, fallback: TextureFormat) -> TextureFormat {
        if !header.flags().contains(DdsFlags::PIXEL_FORMAT)
            || !header.pixel_format.flags().contains(DdsPixelFormatFlags::FOURCC)
        {
            return fallback;
        }

        match header.pixel_format.four_cc {
            FOURCC_DXT1 => TextureFormat::Bc1,
            FOURCC_DXT3 => TextureFormat::Bc2,
            FOURCC_DXT5 => TextureFormat::Bc3,
            _ => fallback,
        }
    }

    /// Byte size of one DXT level: `max(1,(w+3)/4) * max(1,(h+3)/4) * blockFactor`
    pub fn level_size(width: u32, height: u32, format: TextureFormat) -> Result<usize, ParserError> {
        let block_factor = if format == TextureFormat::Bc1 { 8 } else { 16 };
        let blocks_x = width.div_ceil(4).max(1) as usize;
        let blocks_y = height.div_ceil(4).max(1) as usize;
        blocks_x
            .checked_mul(blocks_y)
            .and_then(|blocks| blocks.checked_mul(block_factor))
            .ok_or(ParserError::FormatError {
                reason: "DDS dimensions exceed the addressable size",
            })
    }

    /// Discards up to `requested` leading mip levels, but never the last one and never below 64 pixels.
    pub fn compute_mip_skip(
        width: u32,
        height: u32,
        mip_count: u32,
        requested: u32,
        format: TextureFormat,
    ) -> Result<MipSkip, ParserError> {
        let skip = requested.min(mip_count.saturating_sub(1));
        let (mut w, mut h) = (width, height);
        let mut bytes_skipped: usize = 0;
        let mut levels_skipped = 0;

        while levels_skipped < skip && w > DDS_MIN_SKIP_DIMENSION && h > DDS_MIN_SKIP_DIMENSION {
            bytes_skipped = bytes_skipped
                .checked_add(DdsReader::level_size(w, h, format)?)
                .ok_or(ParserError::FormatError {
                    reason: "DDS mip chain exceeds the addressable size",
                })?;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            levels_skipped += 1;
        }

        Ok(MipSkip {
            levels_skipped,
            bytes_skipped,
            width: w,
            height: h,
        })
    }

    pub fn decode(bytes: &[u8], fallback: TextureFormat, mip_skip: u32) -> Result<DecodedImage, ParserError> {
        if bytes.is_empty() {
            return Err(ParserError::EmptySource);
        }
        ensure_len(bytes, DDS_FILE_HEADER_SIZE)?;

        let header = DdsReader::parse_header(&mut Cursor::new(bytes))?;
        let format = DdsReader::block_format(&header, fallback);
        let mip_count = header.mip_count();
        let skip = DdsReader::compute_mip_skip(header.width, header.height, mip_count, mip_skip, format)?;

        // saturating: anything that large is longer than the buffer anyway
        let payload_offset = DDS_FILE_HEADER_SIZE.saturating_add(skip.bytes_skipped);
        ensure_len(
            bytes,
            payload_offset.saturating_add(DdsReader::level_size(skip.width, skip.height, format)?),
        )?;

        Ok(DecodedImage {
            width: skip.width,
            height: skip.height,
            mip_count: mip_count - skip.levels_skipped,
            format,
            data: bytes[payload_offset..].to_vec(),
        })
    }
}
