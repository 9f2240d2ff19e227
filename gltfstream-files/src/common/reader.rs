use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;
use crate::astc::types::ASTC_MAGIC;
use crate::basis::types::BASIS_SIGNATURE;
use crate::common::types::ContainerKind;
use crate::dds::types::DDS_HEADER_SIZE_FIELD;
use crate::ktx::types::KTX_IDENTIFIER;

pub(crate) trait Parseable<T> {
    fn parse<R: Read>(rdr: &mut R) -> Result<T, ParserError>;
}

impl Parseable<u8> for u8 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u8, ParserError> {
        Ok(rdr.read_u8()?)
    }
}

impl Parseable<u16> for u16 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u16, ParserError> {
        Ok(rdr.read_u16::<LittleEndian>()?)
    }
}

impl Parseable<u32> for u32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u32, ParserError> {
        Ok(rdr.read_u32::<LittleEndian>()?)
    }
}

impl Parseable<f32> for f32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<f32, ParserError> {
        Ok(rdr.read_f32::<LittleEndian>()?)
    }
}

impl<T: Parseable<T> + Copy + Default, const N: usize> Parseable<[T; N]> for [T; N] {
    fn parse<R: Read>(rdr: &mut R) -> Result<[T; N], ParserError> {
        let mut array = [T::default(); N];
        for element in array.iter_mut() {
            *element = T::parse(rdr)?;
        }
        Ok(array)
    }
}

/// Several containers store 24-bit little-endian integers (ASTC dimensions, basis slice counts).
pub fn u24_from_le_bytes(bytes: [u8; 3]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

pub(crate) fn ensure_len(bytes: &[u8], expected: usize) -> Result<(), ParserError> {
    if bytes.len() < expected {
        return Err(ParserError::TruncatedData {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Sniffs the container type from the magic bytes at `offset`. The file extension is never consulted.
/// Order matters: basis, DDS, KTX, ASTC, then the generic image formats.
pub fn detect_container(bytes: &[u8], offset: usize) -> ContainerKind {
    let window = match bytes.get(offset..) {
        Some(window) if !window.is_empty() => window,
        _ => return ContainerKind::Unknown,
    };

    if window.starts_with(&BASIS_SIGNATURE) {
        ContainerKind::Basis
    } else if window.get(4) == Some(&DDS_HEADER_SIZE_FIELD) {
        ContainerKind::Dds
    } else if window.starts_with(&KTX_IDENTIFIER[0..4]) {
        ContainerKind::Ktx
    } else if window.starts_with(&ASTC_MAGIC.to_le_bytes()) {
        ContainerKind::Astc
    } else if is_jpeg(window) {
        ContainerKind::Jpeg
    } else {
        ContainerKind::Png
    }
}

/// SOI followed by an APPn marker
fn is_jpeg(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }

    let soi = u16::from_le_bytes([bytes[0], bytes[1]]);
    let marker = u16::from_le_bytes([bytes[2], bytes[3]]);
    soi == 0xd8ff && (marker & 0xe0ff) == 0xe0ff
}
