use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;
use crate::common::reader::{Parseable, ensure_len};
use crate::common::types::DecodedImage;
use crate::ktx::types::{
    GlInternalFormat, KTX_ENDIANNESS_LE, KTX_HEADER_SIZE, KTX_IDENTIFIER, KtxAsset, KtxHeader, KtxKeyValue,
};

pub struct KtxReader {}

impl KtxReader {
    fn padding(size: usize) -> usize {
        3 - ((size + 3) % 4)
    }

    pub fn parse_header<R: Read>(rdr: &mut R) -> Result<KtxHeader, ParserError> {
        let header = KtxHeader::parse(rdr)?;
        if header.identifier != KTX_IDENTIFIER {
            return Err(ParserError::InvalidMagicValue {
                magic: u32::from_le_bytes([
                    header.identifier[0],
                    header.identifier[1],
                    header.identifier[2],
                    header.identifier[3],
                ]),
            });
        }

        if header.endianness != KTX_ENDIANNESS_LE {
            return Err(ParserError::FormatError {
                reason: "Only little endian KTX files are supported",
            });
        }

        Ok(header)
    }

    /// Parses the key/value block, which is exactly `bytesOfKeyValueData` long.
    /// Each entry is `u32 size`, `size` bytes of `key\0value`, then padding to the next 4 byte boundary.
    pub fn parse_key_values(block: &[u8]) -> Result<Vec<KtxKeyValue>, ParserError> {
        let mut rdr = Cursor::new(block);
        let mut entries = Vec::new();

        while rdr.position() as usize + 4 <= block.len() {
            let size = rdr.read_u32::<LittleEndian>()? as usize;
            let start = rdr.position() as usize;
            let end = start + size;
            if end + KtxReader::padding(size) > block.len() {
                return Err(ParserError::FormatError {
                    reason: "KTX key/value entry exceeds bytesOfKeyValueData",
                });
            }

            if size > 0 {
                let entry = &block[start..end];
                let split = entry.iter().position(|&c| c == 0).unwrap_or(entry.len());
                entries.push(KtxKeyValue {
                    key: String::from_utf8_lossy(&entry[..split]).into_owned(),
                    value: entry.get(split + 1..).map(<[u8]>::to_vec).unwrap_or_default(),
                });
            }

            rdr.set_position((end + KtxReader::padding(size)) as u64);
        }

        Ok(entries)
    }

    pub fn parse_asset(bytes: &[u8]) -> Result<KtxAsset, ParserError> {
        ensure_len(bytes, KTX_HEADER_SIZE)?;
        let header = KtxReader::parse_header(&mut Cursor::new(bytes))?;

        let payload_offset = KTX_HEADER_SIZE + header.bytes_of_key_value_data as usize;
        ensure_len(bytes, payload_offset)?;
        let key_values = KtxReader::parse_key_values(&bytes[KTX_HEADER_SIZE..payload_offset])?;

        let format = GlInternalFormat::try_from(header.gl_internal_format)
            .map_err(|_| ParserError::UnsupportedPixelFormat {
                format: header.gl_internal_format,
            })?
            .texture_format();

        Ok(KtxAsset {
            header,
            format,
            key_values,
            payload_offset,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<DecodedImage, ParserError> {
        let asset = KtxReader::parse_asset(bytes)?;
        let header = &asset.header;
        if header.number_of_faces > 1 || header.number_of_array_elements > 1 || header.pixel_depth > 1 {
            return Err(ParserError::FormatError {
                reason: "Only plain 2D KTX textures are supported",
            });
        }

        let mip_count = header.number_of_mipmap_levels.max(1);
        let mut data = Vec::new();
        let mut offset = asset.payload_offset;
        for _ in 0..mip_count {
            ensure_len(bytes, offset + 4)?;
            let image_size = u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
                as usize;
            offset += 4;
            ensure_len(bytes, offset + image_size)?;
            data.extend_from_slice(&bytes[offset..offset + image_size]);
            offset += image_size + KtxReader::padding(image_size);
        }

        Ok(DecodedImage {
            width: header.pixel_width,
            height: header.pixel_height.max(1),
            mip_count,
            format: asset.format,
            data,
        })
    }
}
