use crate::ParserError;
use crate::common::reader::detect_container;
use crate::common::types::{AstcBlock, ContainerKind, TextureFormat};
use crate::ktx::reader::KtxReader;
use crate::ktx::types::{KTX_ENDIANNESS_LE, KTX_HEADER_SIZE, KTX_IDENTIFIER};

fn synthetic_ktx(internal_format: u32, width: u32, height: u32, key_values: &[u8], levels: &[&[u8]]) -> Vec<u8> {
    let mut bytes = KTX_IDENTIFIER.to_vec();
    let fields = [
        KTX_ENDIANNESS_LE,
        0,
        1,
        0,
        internal_format,
        0,
        width,
        height,
        0,
        0,
        1,
        levels.len() as u32,
        key_values.len() as u32,
    ];
    for field in fields {
        bytes.extend_from_slice(&field.to_le_bytes());
    }
    assert_eq!(bytes.len(), KTX_HEADER_SIZE);

    bytes.extend_from_slice(key_values);
    for level in levels {
        bytes.extend_from_slice(&(level.len() as u32).to_le_bytes());
        bytes.extend_from_slice(level);
    }
    bytes
}

#[test]
fn key_value_block_of_twelve_bytes() -> Result<(), anyhow::Error> {
    // one entry of size 4 ("ab\0c"), followed by an empty entry filling the block
    let mut key_values = Vec::new();
    key_values.extend_from_slice(&4u32.to_le_bytes());
    key_values.extend_from_slice(b"ab\0c");
    key_values.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(key_values.len(), 12);

    let level = [0x5Au8; 16];
    let bytes = synthetic_ktx(0x9278, 4, 4, &key_values, &[&level]);
    let asset = KtxReader::parse_asset(&bytes)?;

    assert_eq!(asset.payload_offset, KTX_HEADER_SIZE + 12);
    assert_eq!(asset.key_values.len(), 1);
    assert_eq!(asset.key_values[0].key, "ab");
    assert_eq!(asset.key_values[0].value, b"c");

    let image = KtxReader::decode(&bytes)?;
    assert_eq!(image.format, TextureFormat::Etc2Rgba8);
    assert_eq!(image.data, level);
    Ok(())
}

#[test]
fn padded_entry_consumes_the_whole_block() -> Result<(), anyhow::Error> {
    let mut key_values = Vec::new();
    key_values.extend_from_slice(&5u32.to_le_bytes());
    key_values.extend_from_slice(b"key\0v");
    key_values.extend_from_slice(&[0, 0, 0]);

    let bytes = synthetic_ktx(0x93B0, 8, 8, &key_values, &[&[1u8; 64]]);
    let asset = KtxReader::parse_asset(&bytes)?;
    assert_eq!(asset.payload_offset, KTX_HEADER_SIZE + 12);
    assert_eq!(asset.format, TextureFormat::Astc(AstcBlock::B4x4));
    Ok(())
}

#[test]
fn unknown_internal_format_is_a_typed_failure() {
    let bytes = synthetic_ktx(0x1234, 4, 4, &[], &[&[0u8; 8]]);
    assert_eq!(detect_container(&bytes, 0), ContainerKind::Ktx);

    let result = KtxReader::decode(&bytes);
    assert!(matches!(result, Err(ParserError::UnsupportedPixelFormat { format: 0x1234 })));
    assert!(result.unwrap_err().is_unsupported_format());
}

#[test]
fn oversized_key_value_entry_is_rejected() {
    let mut key_values = Vec::new();
    key_values.extend_from_slice(&40u32.to_le_bytes());
    key_values.extend_from_slice(&[0u8; 4]);

    let bytes = synthetic_ktx(0x9274, 4, 4, &key_values, &[&[0u8; 8]]);
    assert!(matches!(
        KtxReader::parse_asset(&bytes),
        Err(ParserError::FormatError { .. })
    ));
}
