#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Basis,
    Dds,
    Ktx,
    Astc,
    Jpeg,
    /// Anything that is not recognized otherwise is handed to the generic decoder as PNG.
    Png,
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AstcBlock {
    B4x4,
    B5x4,
    B5x5,
    B6x5,
    B6x6,
    B8x5,
    B8x6,
    B8x8,
    B10x5,
    B10x6,
    B10x8,
    B10x10,
    B12x10,
    B12x12,
}

impl AstcBlock {
    pub fn from_footprint(x: u8, y: u8) -> Option<AstcBlock> {
        Some(match (x, y) {
            (4, 4) => AstcBlock::B4x4,
            (5, 4) => AstcBlock::B5x4,
            (5, 5) => AstcBlock::B5x5,
            (6, 5) => AstcBlock::B6x5,
            (6, 6) => AstcBlock::B6x6,
            (8, 5) => AstcBlock::B8x5,
            (8, 6) => AstcBlock::B8x6,
            (8, 8) => AstcBlock::B8x8,
            (10, 5) => AstcBlock::B10x5,
            (10, 6) => AstcBlock::B10x6,
            (10, 8) => AstcBlock::B10x8,
            (10, 10) => AstcBlock::B10x10,
            (12, 10) => AstcBlock::B12x10,
            (12, 12) => AstcBlock::B12x12,
            _ => return None,
        })
    }

    pub fn footprint(self) -> (u32, u32) {
        match self {
            AstcBlock::B4x4 => (4, 4),
            AstcBlock::B5x4 => (5, 4),
            AstcBlock::B5x5 => (5, 5),
            AstcBlock::B6x5 => (6, 5),
            AstcBlock::B6x6 => (6, 6),
            AstcBlock::B8x5 => (8, 5),
            AstcBlock::B8x6 => (8, 6),
            AstcBlock::B8x8 => (8, 8),
            AstcBlock::B10x5 => (10, 5),
            AstcBlock::B10x6 => (10, 6),
            AstcBlock::B10x8 => (10, 8),
            AstcBlock::B10x10 => (10, 10),
            AstcBlock::B12x10 => (12, 10),
            AstcBlock::B12x12 => (12, 12),
        }
    }
}

/// The pixel formats a decoded image can be handed to the renderer in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgb8,
    /// DXT1
    Bc1,
    /// DXT3
    Bc2,
    /// DXT5
    Bc3,
    Etc2Rgb,
    Etc2Rgb1,
    Etc2Rgba8,
    EacR11,
    EacR11Signed,
    EacRg11,
    EacRg11Signed,
    Astc(AstcBlock),
    /// Still supercompressed, needs to be transcoded by the renderer.
    BasisEtc1s,
    BasisUastc,
}

impl TextureFormat {
    /// The size of one block in bytes, None for uncompressed or supercompressed formats.
    pub fn block_bytes(self) -> Option<usize> {
        match self {
            TextureFormat::Bc1
            | TextureFormat::Etc2Rgb
            | TextureFormat::Etc2Rgb1
            | TextureFormat::EacR11
            | TextureFormat::EacR11Signed => Some(8),
            TextureFormat::Bc2
            | TextureFormat::Bc3
            | TextureFormat::Etc2Rgba8
            | TextureFormat::EacRg11
            | TextureFormat::EacRg11Signed
            | TextureFormat::Astc(_) => Some(16),
            TextureFormat::Rgba8 | TextureFormat::Rgb8 | TextureFormat::BasisEtc1s | TextureFormat::BasisUastc => None,
        }
    }

    pub fn block_dimensions(self) -> (u32, u32) {
        match self {
            TextureFormat::Astc(block) => block.footprint(),
            TextureFormat::Rgba8 | TextureFormat::Rgb8 => (1, 1),
            _ => (4, 4),
        }
    }

    /// Byte size of a single mip level with the given dimensions.
    pub fn level_size(self, width: u32, height: u32) -> usize {
        let (bw, bh) = self.block_dimensions();
        let blocks_x = width.div_ceil(bw).max(1) as usize;
        let blocks_y = height.div_ceil(bh).max(1) as usize;
        match self {
            TextureFormat::Rgba8 => width as usize * height as usize * 4,
            TextureFormat::Rgb8 => width as usize * height as usize * 3,
            _ => blocks_x * blocks_y * self.block_bytes().unwrap_or(16),
        }
    }

    pub fn has_alpha(self) -> bool {
        !matches!(
            self,
            TextureFormat::Rgb8
                | TextureFormat::Bc1
                | TextureFormat::Etc2Rgb
                | TextureFormat::EacR11
                | TextureFormat::EacR11Signed
                | TextureFormat::EacRg11
                | TextureFormat::EacRg11Signed
        )
    }
}

/// Pixel data ready for the renderer. `data` holds all mip levels back to back, largest first.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}
