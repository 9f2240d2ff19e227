use gltfstream_files_derive_parseable::Parse;
use num_enum::TryFromPrimitive;

use crate::common::types::{AstcBlock, TextureFormat};

// https://registry.khronos.org/KTX/specs/1.0/ktxspec.v1.html

pub const KTX_IDENTIFIER: [u8; 12] = [0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A];
pub const KTX_HEADER_SIZE: usize = 64;
pub const KTX_ENDIANNESS_LE: u32 = 0x04030201;

#[derive(Debug, Copy, Clone, Parse)]
pub struct KtxHeader {
    pub identifier: [u8; 12],
    pub endianness: u32,
    pub gl_type: u32,
    pub gl_type_size: u32,
    pub gl_format: u32,
    pub gl_internal_format: u32,
    pub gl_base_internal_format: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub pixel_depth: u32,
    pub number_of_array_elements: u32,
    pub number_of_faces: u32,
    pub number_of_mipmap_levels: u32,
    pub bytes_of_key_value_data: u32,
}

#[derive(Debug, Clone)]
pub struct KtxKeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct KtxAsset {
    pub header: KtxHeader,
    pub format: TextureFormat,
    pub key_values: Vec<KtxKeyValue>,
    /// Absolute offset of the first mip level's imageSize field.
    pub payload_offset: usize,
}

/// The subset of glInternalFormat values we can hand to a renderer.
#[repr(u32)]
#[derive(TryFromPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum GlInternalFormat {
    RGB_S3TC_DXT1 = 0x83F0,
    RGBA_S3TC_DXT1 = 0x83F1,
    RGBA_S3TC_DXT3 = 0x83F2,
    RGBA_S3TC_DXT5 = 0x83F3,
    SRGB_S3TC_DXT1 = 0x8C4C,
    SRGB_ALPHA_S3TC_DXT1 = 0x8C4D,
    SRGB_ALPHA_S3TC_DXT3 = 0x8C4E,
    SRGB_ALPHA_S3TC_DXT5 = 0x8C4F,
    ETC1_RGB8 = 0x8D64,
    R11_EAC = 0x9270,
    SIGNED_R11_EAC = 0x9271,
    RG11_EAC = 0x9272,
    SIGNED_RG11_EAC = 0x9273,
    RGB8_ETC2 = 0x9274,
    SRGB8_ETC2 = 0x9275,
    RGB8_PUNCHTHROUGH_ALPHA1_ETC2 = 0x9276,
    SRGB8_PUNCHTHROUGH_ALPHA1_ETC2 = 0x9277,
    RGBA8_ETC2_EAC = 0x9278,
    SRGB8_ALPHA8_ETC2_EAC = 0x9279,
    RGBA_ASTC_4x4 = 0x93B0,
    RGBA_ASTC_5x4 = 0x93B1,
    RGBA_ASTC_5x5 = 0x93B2,
    RGBA_ASTC_6x5 = 0x93B3,
    RGBA_ASTC_6x6 = 0x93B4,
    RGBA_ASTC_8x5 = 0x93B5,
    RGBA_ASTC_8x6 = 0x93B6,
    RGBA_ASTC_8x8 = 0x93B7,
    RGBA_ASTC_10x5 = 0x93B8,
    RGBA_ASTC_10x6 = 0x93B9,
    RGBA_ASTC_10x8 = 0x93BA,
    RGBA_ASTC_10x10 = 0x93BB,
    RGBA_ASTC_12x10 = 0x93BC,
    RGBA_ASTC_12x12 = 0x93BD,
    SRGB8_ALPHA8_ASTC_4x4 = 0x93D0,
    SRGB8_ALPHA8_ASTC_5x4 = 0x93D1,
    SRGB8_ALPHA8_ASTC_5x5 = 0x93D2,
    SRGB8_ALPHA8_ASTC_6x5 = 0x93D3,
    SRGB8_ALPHA8_ASTC_6x6 = 0x93D4,
    SRGB8_ALPHA8_ASTC_8x5 = 0x93D5,
    SRGB8_ALPHA8_ASTC_8x6 = 0x93D6,
    SRGB8_ALPHA8_ASTC_8x8 = 0x93D7,
    SRGB8_ALPHA8_ASTC_10x5 = 0x93D8,
    SRGB8_ALPHA8_ASTC_10x6 = 0x93D9,
    SRGB8_ALPHA8_ASTC_10x8 = 0x93DA,
    SRGB8_ALPHA8_ASTC_10x10 = 0x93DB,
    SRGB8_ALPHA8_ASTC_12x10 = 0x93DC,
    SRGB8_ALPHA8_ASTC_12x12 = 0x93DD,
}

impl GlInternalFormat {
    pub fn texture_format(self) -> TextureFormat {
        use GlInternalFormat::*;
        match self {
            RGB_S3TC_DXT1 | RGBA_S3TC_DXT1 | SRGB_S3TC_DXT1 | SRGB_ALPHA_S3TC_DXT1 => TextureFormat::Bc1,
            RGBA_S3TC_DXT3 | SRGB_ALPHA_S3TC_DXT3 => TextureFormat::Bc2,
            RGBA_S3TC_DXT5 | SRGB_ALPHA_S3TC_DXT5 => TextureFormat::Bc3,
            ETC1_RGB8 | RGB8_ETC2 | SRGB8_ETC2 => TextureFormat::Etc2Rgb,
            RGB8_PUNCHTHROUGH_ALPHA1_ETC2 | SRGB8_PUNCHTHROUGH_ALPHA1_ETC2 => TextureFormat::Etc2Rgb1,
            RGBA8_ETC2_EAC | SRGB8_ALPHA8_ETC2_EAC => TextureFormat::Etc2Rgba8,
            R11_EAC => TextureFormat::EacR11,
            SIGNED_R11_EAC => TextureFormat::EacR11Signed,
            RG11_EAC => TextureFormat::EacRg11,
            SIGNED_RG11_EAC => TextureFormat::EacRg11Signed,
            RGBA_ASTC_4x4 | SRGB8_ALPHA8_ASTC_4x4 => TextureFormat::Astc(AstcBlock::B4x4),
            RGBA_ASTC_5x4 | SRGB8_ALPHA8_ASTC_5x4 => TextureFormat::Astc(AstcBlock::B5x4),
            RGBA_ASTC_5x5 | SRGB8_ALPHA8_ASTC_5x5 => TextureFormat::Astc(AstcBlock::B5x5),
            RGBA_ASTC_6x5 | SRGB8_ALPHA8_ASTC_6x5 => TextureFormat::Astc(AstcBlock::B6x5),
            RGBA_ASTC_6x6 | SRGB8_ALPHA8_ASTC_6x6 => TextureFormat::Astc(AstcBlock::B6x6),
            RGBA_ASTC_8x5 | SRGB8_ALPHA8_ASTC_8x5 => TextureFormat::Astc(AstcBlock::B8x5),
            RGBA_ASTC_8x6 | SRGB8_ALPHA8_ASTC_8x6 => TextureFormat::Astc(AstcBlock::B8x6),
            RGBA_ASTC_8x8 | SRGB8_ALPHA8_ASTC_8x8 => TextureFormat::Astc(AstcBlock::B8x8),
            RGBA_ASTC_10x5 | SRGB8_ALPHA8_ASTC_10x5 => TextureFormat::Astc(AstcBlock::B10x5),
            RGBA_ASTC_10x6 | SRGB8_ALPHA8_ASTC_10x6 => TextureFormat::Astc(AstcBlock::B10x6),
            RGBA_ASTC_10x8 | SRGB8_ALPHA8_ASTC_10x8 => TextureFormat::Astc(AstcBlock::B10x8),
            RGBA_ASTC_10x10 | SRGB8_ALPHA8_ASTC_10x10 => TextureFormat::Astc(AstcBlock::B10x10),
            RGBA_ASTC_12x10 | SRGB8_ALPHA8_ASTC_12x10 => TextureFormat::Astc(AstcBlock::B12x10),
            RGBA_ASTC_12x12 | SRGB8_ALPHA8_ASTC_12x12 => TextureFormat::Astc(AstcBlock::B12x12),
        }
    }
}
