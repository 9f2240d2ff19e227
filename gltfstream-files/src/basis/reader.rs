use std::io::{Cursor, Read};

use crate::ParserError;
use crate::basis::types::{
    BASIS_HEADER_SIZE, BASIS_SIGNATURE, BASIS_SLICE_DESC_SIZE, BASIS_TEX_FORMAT_ETC1S, BASIS_TEX_FORMAT_UASTC_4X4,
    BasisAsset, BasisHeader, BasisSliceDesc,
};
use crate::common::reader::{Parseable, ensure_len};
use crate::common::types::{DecodedImage, TextureFormat};

pub struct BasisReader {}

impl BasisReader {
    pub fn parse_header<R: Read>(rdr: &mut R) -> Result<BasisHeader, ParserError> {
        let header = BasisHeader::parse(rdr)?;
        if header.signature != u16::from_le_bytes(BASIS_SIGNATURE) {
            return Err(ParserError::InvalidMagicValue {
                magic: header.signature as u32,
            });
        }

        if header.header_size as usize != BASIS_HEADER_SIZE {
            return Err(ParserError::FormatError {
                reason: "Basis header size MUST BE 77",
            });
        }

        Ok(header)
    }

    pub fn parse_asset(bytes: &[u8]) -> Result<BasisAsset, ParserError> {
        ensure_len(bytes, BASIS_HEADER_SIZE)?;
        let header = BasisReader::parse_header(&mut Cursor::new(bytes))?;

        let slice_count = header.total_slices() as usize;
        if slice_count == 0 {
            return Err(ParserError::EmptySource);
        }

        let slices_start = header.slice_desc_file_ofs as usize;
        ensure_len(bytes, slices_start + slice_count * BASIS_SLICE_DESC_SIZE)?;
        let mut rdr = Cursor::new(&bytes[slices_start..]);
        let slices = (0..slice_count)
            .map(|_| BasisSliceDesc::parse(&mut rdr))
            .collect::<Result<Vec<_>, _>>()?;

        for slice in &slices {
            ensure_len(bytes, slice.file_ofs as usize + slice.file_size as usize)?;
        }

        Ok(BasisAsset { header, slices })
    }

    /// Basis files are transcoded by the renderer, so the decoded image keeps the whole file as payload.
    /// Dimensions and mip count describe image 0.
    pub fn decode(bytes: &[u8]) -> Result<DecodedImage, ParserError> {
        let asset = BasisReader::parse_asset(bytes)?;
        let format = match asset.header.tex_format {
            BASIS_TEX_FORMAT_ETC1S => TextureFormat::BasisEtc1s,
            BASIS_TEX_FORMAT_UASTC_4X4 => TextureFormat::BasisUastc,
            other => return Err(ParserError::UnsupportedPixelFormat { format: other as u32 }),
        };

        let levels: Vec<&BasisSliceDesc> = asset
            .slices
            .iter()
            .filter(|slice| slice.image_index() == 0 && !slice.is_alpha_slice())
            .collect();
        let base = levels
            .iter()
            .find(|slice| slice.level_index == 0)
            .ok_or(ParserError::FormatError {
                reason: "Basis file has no level 0 slice for image 0",
            })?;

        Ok(DecodedImage {
            width: base.orig_width as u32,
            height: base.orig_height as u32,
            mip_count: levels.len() as u32,
            format,
            data: bytes.to_vec(),
        })
    }
}
