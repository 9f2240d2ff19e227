//! A fast bounding-box BC1/BC3 encoder, used when uploaded textures are recompressed.
//! Quality is not a goal, the blocks only need to decode to something recognizable.

use crate::ParserError;
use crate::common::reader::ensure_len;

fn to_565(rgb: [u8; 3]) -> u16 {
    ((rgb[0] as u16 >> 3) << 11) | ((rgb[1] as u16 >> 2) << 5) | (rgb[2] as u16 >> 3)
}

fn from_565(color: u16) -> [u8; 3] {
    let r = ((color >> 11) & 0x1F) as u8;
    let g = ((color >> 5) & 0x3F) as u8;
    let b = (color & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

/// Gathers a 4x4 block as RGBA, clamping at the image border.
fn fetch_block(pixels: &[u8], channels: usize, width: u32, height: u32, bx: u32, by: u32) -> [[u8; 4]; 16] {
    let mut block = [[0u8; 4]; 16];
    for (i, texel) in block.iter_mut().enumerate() {
        let x = (bx * 4 + (i as u32 % 4)).min(width - 1);
        let y = (by * 4 + (i as u32 / 4)).min(height - 1);
        let offset = (y as usize * width as usize + x as usize) * channels;
        texel[0] = pixels[offset];
        texel[1] = pixels[offset + 1];
        texel[2] = pixels[offset + 2];
        texel[3] = if channels == 4 { pixels[offset + 3] } else { 255 };
    }
    block
}

fn encode_color_block(block: &[[u8; 4]; 16], out: &mut Vec<u8>) {
    let mut min = [255u8; 3];
    let mut max = [0u8; 3];
    for texel in block {
        for c in 0..3 {
            min[c] = min[c].min(texel[c]);
            max[c] = max[c].max(texel[c]);
        }
    }

    let mut c0 = to_565(max);
    let mut c1 = to_565(min);
    // c0 > c1 selects the four color mode
    if c0 < c1 {
        std::mem::swap(&mut c0, &mut c1);
    }

    let mut indices = 0u32;
    if c0 != c1 {
        let e0 = from_565(c0);
        let e1 = from_565(c1);
        let palette = [
            e0,
            e1,
            [
                ((2 * e0[0] as u16 + e1[0] as u16) / 3) as u8,
                ((2 * e0[1] as u16 + e1[1] as u16) / 3) as u8,
                ((2 * e0[2] as u16 + e1[2] as u16) / 3) as u8,
            ],
            [
                ((e0[0] as u16 + 2 * e1[0] as u16) / 3) as u8,
                ((e0[1] as u16 + 2 * e1[1] as u16) / 3) as u8,
                ((e0[2] as u16 + 2 * e1[2] as u16) / 3) as u8,
            ],
        ];

        for (i, texel) in block.iter().enumerate() {
            let rgb = [texel[0], texel[1], texel[2]];
            let best = (0..4u32)
                .min_by_key(|&p| distance(rgb, palette[p as usize]))
                .unwrap_or(0);
            indices |= best << (i * 2);
        }
    }

    out.extend_from_slice(&c0.to_le_bytes());
    out.extend_from_slice(&c1.to_le_bytes());
    out.extend_from_slice(&indices.to_le_bytes());
}

fn encode_alpha_block(block: &[[u8; 4]; 16], out: &mut Vec<u8>) {
    let a0 = block.iter().map(|texel| texel[3]).max().unwrap_or(255);
    let a1 = block.iter().map(|texel| texel[3]).min().unwrap_or(255);

    let mut palette = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for i in 1..7u16 {
            palette[i as usize + 1] = (((7 - i) * a0 as u16 + i * a1 as u16) / 7) as u8;
        }
    }

    let mut indices = 0u64;
    if a0 != a1 {
        for (i, texel) in block.iter().enumerate() {
            let best = (0..8u64)
                .min_by_key(|&p| (palette[p as usize] as i32 - texel[3] as i32).unsigned_abs())
                .unwrap_or(0);
            indices |= best << (i * 3);
        }
    }

    out.push(a0);
    out.push(a1);
    out.extend_from_slice(&indices.to_le_bytes()[..6]);
}

fn encode<F>(pixels: &[u8], channels: usize, width: u32, height: u32, block_bytes: usize, mut emit: F) -> Result<Vec<u8>, ParserError>
where
    F: FnMut(&[[u8; 4]; 16], &mut Vec<u8>),
{
    if width == 0 || height == 0 {
        return Err(ParserError::EmptySource);
    }
    ensure_len(pixels, width as usize * height as usize * channels)?;

    let blocks_x = width.div_ceil(4);
    let blocks_y = height.div_ceil(4);
    let mut out = Vec::with_capacity(blocks_x as usize * blocks_y as usize * block_bytes);
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let block = fetch_block(pixels, channels, width, height, bx, by);
            emit(&block, &mut out);
        }
    }
    Ok(out)
}

/// `channels` is 3 for RGB8 and 4 for RGBA8 input, alpha is dropped.
pub fn encode_bc1(pixels: &[u8], channels: usize, width: u32, height: u32) -> Result<Vec<u8>, ParserError> {
    encode(pixels, channels, width, height, 8, encode_color_block)
}

pub fn encode_bc3(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ParserError> {
    encode(pixels, 4, width, height, 16, |block, out| {
        encode_alpha_block(block, out);
        encode_color_block(block, out);
    })
}
