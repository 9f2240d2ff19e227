use bitflags::bitflags;
use gltfstream_files_derive_parseable::Parse;

// https://learn.microsoft.com/en-us/windows/win32/direct3ddds/dds-header

pub const FOURCC_DDS: u32 = u32::from_le_bytes(*b"DDS ");
pub const FOURCC_DXT1: u32 = u32::from_le_bytes(*b"DXT1");
pub const FOURCC_DXT3: u32 = u32::from_le_bytes(*b"DXT3");
pub const FOURCC_DXT5: u32 = u32::from_le_bytes(*b"DXT5");

/// magic + header
pub const DDS_FILE_HEADER_SIZE: usize = 128;
/// The header's own size field, which sits right after the magic.
pub const DDS_HEADER_SIZE_FIELD: u8 = 124;

/// Mip skipping stops once either dimension would drop to this size.
pub const DDS_MIN_SKIP_DIMENSION: u32 = 64;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DdsFlags: u32 {
        const CAPS = 0x1;
        const HEIGHT = 0x2;
        const WIDTH = 0x4;
        const PITCH = 0x8;
        const PIXEL_FORMAT = 0x1000;
        const MIPMAP_COUNT = 0x20000;
        const LINEAR_SIZE = 0x80000;
        const DEPTH = 0x800000;
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DdsPixelFormatFlags: u32 {
        const ALPHA_PIXELS = 0x1;
        const ALPHA = 0x2;
        const FOURCC = 0x4;
        const RGB = 0x40;
        const YUV = 0x200;
        const LUMINANCE = 0x20000;
    }
}

#[derive(Debug, Copy, Clone, Parse)]
pub struct DdsPixelFormat {
    pub size: u32,
    pub flags: u32,
    pub four_cc: u32,
    pub rgb_bit_count: u32,
    pub r_bit_mask: u32,
    pub g_bit_mask: u32,
    pub b_bit_mask: u32,
    pub a_bit_mask: u32,
}

impl DdsPixelFormat {
    pub fn flags(&self) -> DdsPixelFormatFlags {
        DdsPixelFormatFlags::from_bits_truncate(self.flags)
    }
}

/// Everything after the "DDS " magic.
#[derive(Debug, Copy, Clone, Parse)]
pub struct DdsHeader {
    pub size: u32,
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mip_map_count: u32,
    pub reserved: [u32; 11],
    pub pixel_format: DdsPixelFormat,
    pub caps: u32,
    pub caps2: u32,
    pub caps3: u32,
    pub caps4: u32,
    pub reserved2: u32,
}

impl DdsHeader {
    pub fn flags(&self) -> DdsFlags {
        DdsFlags::from_bits_truncate(self.flags)
    }

    pub fn mip_count(&self) -> u32 {
        if self.flags().contains(DdsFlags::MIPMAP_COUNT) {
            self.mip_map_count.max(1)
        } else {
            1
        }
    }
}

/// The outcome of skipping the largest mip levels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MipSkip {
    pub levels_skipped: u32,
    pub bytes_skipped: usize,
    pub width: u32,
    pub height: u32,
}
