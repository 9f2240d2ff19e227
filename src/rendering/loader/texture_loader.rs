use gltfstream_files::ParserError;
use gltfstream_files::astc::reader::AstcReader;
use gltfstream_files::basis::reader::BasisReader;
use gltfstream_files::bcn::encoder::{encode_bc1, encode_bc3};
use gltfstream_files::common::reader::detect_container;
use gltfstream_files::common::types::{ContainerKind, DecodedImage, TextureFormat};
use gltfstream_files::dds::reader::DdsReader;
use gltfstream_files::ktx::reader::KtxReader;
use image::DynamicImage;
use image::imageops::FilterType;
use log::{trace, warn};

use crate::error::ImportError;
use crate::settings::ImportOptions;

#[derive(Debug, Copy, Clone)]
pub struct TextureLoadSettings {
    pub compress: bool,
    pub mipmapping: bool,
    pub max_dimension: u32,
    pub mip_skip: u32,
    /// Block format assumed for DDS files without a FourCC we know.
    pub dds_fallback: TextureFormat,
}

impl From<&ImportOptions> for TextureLoadSettings {
    fn from(options: &ImportOptions) -> Self {
        Self {
            compress: options.texture_compression,
            mipmapping: options.mipmapping,
            max_dimension: options.max_image_dimension.max(1),
            mip_skip: options.mipmap_skip,
            dds_fallback: TextureFormat::Bc3,
        }
    }
}

pub struct TextureLoader {}

impl TextureLoader {
    /// Sniffs the container and decodes it. Specialized containers that fail to decode fall back to the generic
    /// PNG/JPEG path, only if that fails as well the whole image is considered lost.
    pub fn decode(bytes: &[u8], label: &str, settings: &TextureLoadSettings) -> Result<DecodedImage, ImportError> {
        profiling::scope!("TextureLoader::decode");

        match TextureLoader::decode_container(bytes, settings) {
            Ok(Some(image)) => {
                trace!(
                    "Decoded {} as {:?} {}x{} with {} mips",
                    label, image.format, image.width, image.height, image.mip_count
                );
                return Ok(image);
            }
            Ok(None) => {}
            Err(err) => warn!("Could not decode {}: {}. Trying the generic decoder", label, err),
        }

        TextureLoader::decode_generic(bytes, label, settings)
    }

    fn decode_container(bytes: &[u8], settings: &TextureLoadSettings) -> Result<Option<DecodedImage>, ParserError> {
        let image = match detect_container(bytes, 0) {
            ContainerKind::Basis => BasisReader::decode(bytes)?,
            ContainerKind::Dds => DdsReader::decode(bytes, settings.dds_fallback, settings.mip_skip)?,
            ContainerKind::Ktx => KtxReader::decode(bytes)?,
            ContainerKind::Astc => AstcReader::decode(bytes)?,
            ContainerKind::Jpeg | ContainerKind::Png => return Ok(None),
            ContainerKind::Unknown => return Err(ParserError::EmptySource),
        };
        Ok(Some(image))
    }

    pub fn decode_generic(bytes: &[u8], label: &str, settings: &TextureLoadSettings) -> Result<DecodedImage, ImportError> {
        let has_alpha = detect_container(bytes, 0) != ContainerKind::Jpeg;
        let mut image = image::load_from_memory(bytes).map_err(|err| ImportError::DecodeFailure {
            label: label.to_string(),
            reason: err.to_string(),
        })?;

        if image.width() > settings.max_dimension || image.height() > settings.max_dimension {
            // resize keeps the aspect ratio
            image = image.resize(settings.max_dimension, settings.max_dimension, FilterType::Triangle);
            trace!("Downscaled {} to {}x{}", label, image.width(), image.height());
        }

        let (width, height) = (image.width(), image.height());
        let levels = if settings.mipmapping {
            TextureLoader::mip_chain(image)
        } else {
            vec![image]
        };
        let mip_count = levels.len() as u32;

        let format = match (settings.compress, has_alpha) {
            (true, true) => TextureFormat::Bc3,
            (true, false) => TextureFormat::Bc1,
            (false, true) => TextureFormat::Rgba8,
            (false, false) => TextureFormat::Rgb8,
        };

        let compression_failed = |err: ParserError| ImportError::DecodeFailure {
            label: label.to_string(),
            reason: err.to_string(),
        };

        let mut data = vec![];
        for level in levels {
            let (w, h) = (level.width(), level.height());
            let encoded = match format {
                TextureFormat::Bc3 => encode_bc3(&level.into_rgba8().into_raw(), w, h).map_err(compression_failed)?,
                TextureFormat::Bc1 => {
                    encode_bc1(&level.into_rgb8().into_raw(), 3, w, h).map_err(compression_failed)?
                }
                TextureFormat::Rgba8 => level.into_rgba8().into_raw(),
                _ => level.into_rgb8().into_raw(),
            };
            data.extend(encoded);
        }

        Ok(DecodedImage {
            width,
            height,
            mip_count,
            format,
            data,
        })
    }

    /// The full chain down to 1x1, largest level first.
    fn mip_chain(image: DynamicImage) -> Vec<DynamicImage> {
        let mut levels = vec![image];
        loop {
            let last = &levels[levels.len() - 1];
            if last.width() == 1 && last.height() == 1 {
                break;
            }
            let next = last.resize_exact(
                (last.width() / 2).max(1),
                (last.height() / 2).max(1),
                FilterType::Triangle,
            );
            levels.push(next);
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 128]));
        let mut bytes = Cursor::new(vec![]);
        DynamicImage::ImageRgba8(image)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn settings() -> TextureLoadSettings {
        TextureLoadSettings::from(&ImportOptions::default())
    }

    #[test]
    fn png_is_recompressed_with_mips() {
        let image = TextureLoader::decode(&png(8, 4), "test.png", &settings()).unwrap();
        assert_eq!(image.format, TextureFormat::Bc3);
        assert_eq!((image.width, image.height), (8, 4));
        // 8x4, 4x2, 2x1, 1x1
        assert_eq!(image.mip_count, 4);
        assert_eq!(image.data.len(), (2 + 1 + 1 + 1) * 16);
    }

    #[test]
    fn oversized_images_keep_their_aspect_ratio() {
        let settings = TextureLoadSettings {
            compress: false,
            mipmapping: false,
            max_dimension: 4,
            ..settings()
        };
        let image = TextureLoader::decode(&png(16, 8), "big.png", &settings).unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(image.format, TextureFormat::Rgba8);
        assert_eq!(image.data.len(), 4 * 2 * 4);
    }

    #[test]
    fn garbage_fails_with_a_decode_failure() {
        let err = TextureLoader::decode(&[1, 2, 3, 4, 5, 6, 7, 8], "noise.bin", &settings()).unwrap_err();
        assert!(matches!(err, ImportError::DecodeFailure { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn broken_specialized_container_falls_back() {
        // the KTX identifier, followed by nothing useful
        let mut bytes = vec![0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB];
        bytes.resize(20, 0);
        let err = TextureLoader::decode(&bytes, "broken.ktx", &settings()).unwrap_err();
        assert!(matches!(err, ImportError::DecodeFailure { .. }));
    }
}
