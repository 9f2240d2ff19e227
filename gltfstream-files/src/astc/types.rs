use gltfstream_files_derive_parseable::Parse;

use crate::common::reader::u24_from_le_bytes;

/// `13 AB A1 5C`
pub const ASTC_MAGIC: u32 = 0x5CA1AB13;
pub const ASTC_HEADER_SIZE: usize = 16;

#[derive(Debug, Copy, Clone, Parse)]
pub struct AstcHeader {
    pub magic: u32,
    pub block_x: u8,
    pub block_y: u8,
    pub block_z: u8,
    pub x_size: [u8; 3],
    pub y_size: [u8; 3],
    pub z_size: [u8; 3],
}

impl AstcHeader {
    pub fn width(&self) -> u32 {
        u24_from_le_bytes(self.x_size)
    }

    pub fn height(&self) -> u32 {
        u24_from_le_bytes(self.y_size)
    }

    pub fn depth(&self) -> u32 {
        u24_from_le_bytes(self.z_size)
    }
}
