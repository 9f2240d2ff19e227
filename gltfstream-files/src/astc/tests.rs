use crate::ParserError;
use crate::astc::reader::AstcReader;
use crate::astc::types::ASTC_MAGIC;
use crate::common::reader::detect_container;
use crate::common::types::{AstcBlock, ContainerKind, TextureFormat};

fn synthetic_astc(block: (u8, u8), width: u32, height: u32, payload: usize) -> Vec<u8> {
    let mut bytes = ASTC_MAGIC.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[block.0, block.1, 1]);
    bytes.extend_from_slice(&width.to_le_bytes()[..3]);
    bytes.extend_from_slice(&height.to_le_bytes()[..3]);
    bytes.extend_from_slice(&1u32.to_le_bytes()[..3]);
    bytes.extend(std::iter::repeat(0xA5).take(payload));
    bytes
}

#[test]
fn non_square_dimensions_are_not_swapped() -> Result<(), anyhow::Error> {
    // 20x8 with 5x4 blocks: 4 * 2 blocks
    let bytes = synthetic_astc((5, 4), 20, 8, 8 * 16);
    assert_eq!(detect_container(&bytes, 0), ContainerKind::Astc);

    let image = AstcReader::decode(&bytes)?;
    assert_eq!((image.width, image.height), (20, 8));
    assert_eq!(image.format, TextureFormat::Astc(AstcBlock::B5x4));
    assert_eq!(image.data.len(), 8 * 16);
    Ok(())
}

#[test]
fn large_24_bit_dimensions() -> Result<(), anyhow::Error> {
    let bytes = synthetic_astc((8, 8), 70000, 8, (70000usize.div_ceil(8)) * 16);
    let image = AstcReader::decode(&bytes)?;
    assert_eq!(image.width, 70000);
    Ok(())
}

#[test]
fn unknown_footprint_is_unsupported() {
    let bytes = synthetic_astc((7, 3), 16, 16, 256);
    let result = AstcReader::decode(&bytes);
    assert!(matches!(
        result,
        Err(ParserError::UnsupportedBlockFootprint { x: 7, y: 3, z: 1 })
    ));
}

#[test]
fn truncated_payload() {
    let bytes = synthetic_astc((4, 4), 16, 16, 10);
    assert!(matches!(AstcReader::decode(&bytes), Err(ParserError::TruncatedData { .. })));
}
