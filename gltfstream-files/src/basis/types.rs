use gltfstream_files_derive_parseable::Parse;

use crate::common::reader::u24_from_le_bytes;

// https://github.com/BinomialLLC/basis_universal/wiki/.basis-File-Format-and-ETC1S-Texture-Video-Specification

/// "sB"
pub const BASIS_SIGNATURE: [u8; 2] = [0x73, 0x42];
pub const BASIS_HEADER_SIZE: usize = 77;
pub const BASIS_SLICE_DESC_SIZE: usize = 23;

pub const BASIS_TEX_FORMAT_ETC1S: u8 = 0;
pub const BASIS_TEX_FORMAT_UASTC_4X4: u8 = 1;

pub const BASIS_SLICE_FLAG_HAS_ALPHA: u8 = 0x1;

#[derive(Debug, Copy, Clone, Parse)]
pub struct BasisHeader {
    pub signature: u16,
    pub version: u16,
    pub header_size: u16,
    pub header_crc16: u16,
    pub data_size: u32,
    pub data_crc16: u16,
    pub total_slices: [u8; 3],
    pub total_images: [u8; 3],
    pub tex_format: u8,
    pub flags: u16,
    pub tex_type: u8,
    pub us_per_frame: [u8; 3],
    pub reserved: u32,
    pub userdata0: u32,
    pub userdata1: u32,
    pub total_endpoints: u16,
    pub endpoint_cb_file_ofs: u32,
    pub endpoint_cb_file_size: [u8; 3],
    pub total_selectors: u16,
    pub selector_cb_file_ofs: u32,
    pub selector_cb_file_size: [u8; 3],
    pub tables_file_ofs: u32,
    pub tables_file_size: u32,
    pub slice_desc_file_ofs: u32,
    pub extended_file_ofs: u32,
    pub extended_file_size: u32,
}

impl BasisHeader {
    pub fn total_slices(&self) -> u32 {
        u24_from_le_bytes(self.total_slices)
    }

    pub fn total_images(&self) -> u32 {
        u24_from_le_bytes(self.total_images)
    }
}

#[derive(Debug, Copy, Clone, Parse)]
pub struct BasisSliceDesc {
    pub image_index: [u8; 3],
    pub level_index: u8,
    pub flags: u8,
    pub orig_width: u16,
    pub orig_height: u16,
    pub num_blocks_x: u16,
    pub num_blocks_y: u16,
    pub file_ofs: u32,
    pub file_size: u32,
    pub slice_data_crc16: u16,
}

impl BasisSliceDesc {
    pub fn image_index(&self) -> u32 {
        u24_from_le_bytes(self.image_index)
    }

    pub fn is_alpha_slice(&self) -> bool {
        self.flags & BASIS_SLICE_FLAG_HAS_ALPHA != 0
    }
}

#[derive(Debug, Clone)]
pub struct BasisAsset {
    pub header: BasisHeader,
    pub slices: Vec<BasisSliceDesc>,
}
