use crate::ParserError;
use crate::basis::reader::BasisReader;
use crate::basis::types::{BASIS_HEADER_SIZE, BASIS_SLICE_DESC_SIZE};
use crate::common::reader::detect_container;
use crate::common::types::{ContainerKind, TextureFormat};

fn synthetic_basis(tex_format: u8, levels: &[(u16, u16)]) -> Vec<u8> {
    let slice_desc_ofs = BASIS_HEADER_SIZE as u32;
    let data_ofs = slice_desc_ofs + (levels.len() * BASIS_SLICE_DESC_SIZE) as u32;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"sB");
    bytes.extend_from_slice(&0x13u16.to_le_bytes());
    bytes.extend_from_slice(&(BASIS_HEADER_SIZE as u16).to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&(levels.len() as u32).to_le_bytes()[..3]);
    bytes.extend_from_slice(&1u32.to_le_bytes()[..3]);
    bytes.push(tex_format);
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.push(0);
    bytes.extend_from_slice(&[0; 3]);
    bytes.extend_from_slice(&[0; 12]);
    bytes.extend_from_slice(&[0; 2 + 4 + 3]);
    bytes.extend_from_slice(&[0; 2 + 4 + 3]);
    bytes.extend_from_slice(&[0; 8]);
    bytes.extend_from_slice(&slice_desc_ofs.to_le_bytes());
    bytes.extend_from_slice(&[0; 8]);
    assert_eq!(bytes.len(), BASIS_HEADER_SIZE);

    for (level, (width, height)) in levels.iter().enumerate() {
        bytes.extend_from_slice(&[0; 3]);
        bytes.push(level as u8);
        bytes.push(0);
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(&width.div_ceil(4).to_le_bytes());
        bytes.extend_from_slice(&height.div_ceil(4).to_le_bytes());
        bytes.extend_from_slice(&data_ofs.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
    }
    bytes.extend_from_slice(&[0xEE; 4]);
    bytes
}

#[test]
fn uastc_levels() -> Result<(), anyhow::Error> {
    let bytes = synthetic_basis(1, &[(256, 128), (128, 64), (64, 32)]);
    assert_eq!(detect_container(&bytes, 0), ContainerKind::Basis);

    let image = BasisReader::decode(&bytes)?;
    assert_eq!(image.format, TextureFormat::BasisUastc);
    assert_eq!((image.width, image.height), (256, 128));
    assert_eq!(image.mip_count, 3);
    assert_eq!(image.data.len(), bytes.len());
    Ok(())
}

#[test]
fn slice_outside_the_file_is_truncated() {
    let mut bytes = synthetic_basis(0, &[(16, 16)]);
    bytes.truncate(bytes.len() - 2);
    assert!(matches!(BasisReader::decode(&bytes), Err(ParserError::TruncatedData { .. })));
}

#[test]
fn unknown_tex_format() {
    let bytes = synthetic_basis(7, &[(16, 16)]);
    assert!(matches!(
        BasisReader::decode(&bytes),
        Err(ParserError::UnsupportedPixelFormat { format: 7 })
    ));
}
