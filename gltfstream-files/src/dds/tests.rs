use crate::common::reader::detect_container;
use crate::common::types::{ContainerKind, TextureFormat};
use crate::dds::reader::DdsReader;
use crate::ParserError;
use crate::dds::types::{DDS_FILE_HEADER_SIZE, DdsFlags, DdsPixelFormatFlags, FOURCC_DDS, FOURCC_DXT1, FOURCC_DXT5};

fn synthetic_dds(width: u32, height: u32, mip_count: u32, four_cc: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut push = |value: u32| bytes.extend_from_slice(&value.to_le_bytes());
    push(FOURCC_DDS);
    push(124);
    push((DdsFlags::CAPS | DdsFlags::PIXEL_FORMAT | DdsFlags::MIPMAP_COUNT).bits());
    push(height);
    push(width);
    push(0);
    push(0);
    push(mip_count);
    for _ in 0..11 {
        push(0);
    }
    push(32);
    push(DdsPixelFormatFlags::FOURCC.bits());
    push(four_cc);
    for _ in 0..5 {
        push(0);
    }
    for _ in 0..5 {
        push(0);
    }
    assert_eq!(bytes.len(), DDS_FILE_HEADER_SIZE);

    let format = if four_cc == FOURCC_DXT1 { TextureFormat::Bc1 } else { TextureFormat::Bc3 };
    let (mut w, mut h) = (width, height);
    for level in 0..mip_count {
        let size = DdsReader::level_size(w, h, format).expect("level size");
        bytes.extend(std::iter::repeat(level as u8).take(size));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    bytes
}

#[test]
fn mip_skip_halts_at_64() -> Result<(), anyhow::Error> {
    let bytes = synthetic_dds(4096, 4096, 12, FOURCC_DXT5);
    let image = DdsReader::decode(&bytes, TextureFormat::Bc3, 10)?;

    assert_eq!(image.width, 64);
    assert_eq!(image.height, 64);
    assert_eq!(image.format, TextureFormat::Bc3);
    assert_eq!(image.mip_count, 6);

    let expected_skipped: usize = [4096u32, 2048, 1024, 512, 256, 128]
        .iter()
        .map(|&dim| (dim as usize).div_ceil(4) * (dim as usize).div_ceil(4) * 16)
        .sum();
    let skip = DdsReader::compute_mip_skip(4096, 4096, 12, 10, TextureFormat::Bc3)?;
    assert_eq!(skip.levels_skipped, 6);
    assert_eq!(skip.bytes_skipped, expected_skipped);
    assert_eq!(image.data.len(), bytes.len() - DDS_FILE_HEADER_SIZE - expected_skipped);
    // the first remaining level was filled with its level index
    assert_eq!(image.data[0], 6);
    Ok(())
}

#[test]
fn skip_never_discards_the_last_level() -> Result<(), anyhow::Error> {
    let bytes = synthetic_dds(512, 512, 2, FOURCC_DXT1);
    let image = DdsReader::decode(&bytes, TextureFormat::Bc3, 8)?;

    assert_eq!(image.format, TextureFormat::Bc1);
    assert_eq!(image.mip_count, 1);
    assert_eq!((image.width, image.height), (256, 256));
    Ok(())
}

#[test]
fn unknown_fourcc_keeps_the_fallback() -> Result<(), anyhow::Error> {
    let bytes = synthetic_dds(128, 128, 1, u32::from_le_bytes(*b"ATI2"));
    let image = DdsReader::decode(&bytes, TextureFormat::Bc3, 0)?;
    assert_eq!(image.format, TextureFormat::Bc3);
    assert_eq!(image.data.len(), 32 * 32 * 16);
    Ok(())
}

#[test]
fn detection_and_truncation() {
    let bytes = synthetic_dds(64, 64, 1, FOURCC_DXT1);
    assert_eq!(detect_container(&bytes, 0), ContainerKind::Dds);
    assert!(DdsReader::decode(&bytes[..DDS_FILE_HEADER_SIZE + 10], TextureFormat::Bc3, 0).is_err());
    assert!(DdsReader::decode(&[], TextureFormat::Bc3, 0).is_err());
}

#[test]
fn impossible_dimensions_are_format_errors() {
    let mut bytes = synthetic_dds(4, 4, 1, FOURCC_DXT5);
    // height and width follow magic, size and flags
    bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
    bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

    let result = DdsReader::decode(&bytes, TextureFormat::Bc3, 0);
    assert!(matches!(result, Err(ParserError::FormatError { .. })));
    assert!(matches!(
        DdsReader::compute_mip_skip(u32::MAX, u32::MAX, 32, 4, TextureFormat::Bc3),
        Err(ParserError::FormatError { .. })
    ));
}

#[test]
fn huge_but_representable_levels_are_truncated_data() {
    let mut bytes = synthetic_dds(4, 4, 1, FOURCC_DXT1);
    bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
    bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

    let result = DdsReader::decode(&bytes, TextureFormat::Bc1, 0);
    assert!(matches!(result, Err(ParserError::TruncatedData { .. })));
}
