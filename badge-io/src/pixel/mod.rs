//! Pixel codec
//!
//! Renderers draw into an intermediate buffer with one gray byte per pixel.
//! The badge wants packed bit-planes: each row is split into 8-pixel blocks,
//! and each block becomes one byte per plane.
//!
//! ```text
//! pixels   p0 p1 p2 p3 p4 p5 p6 p7      level = gray >> 6 (0..=3)
//! plane 0  [b7 ............... b0]      bit (7 - i) = level(p_i) & 1
//! plane 1  [b7 ............... b0]      bit (7 - i) = level(p_i) >> 1   (2-bit format only)
//! ```
//!
//! A block is stored as `[plane0, plane1]` (2-bit) or `[plane0]` (1-bit);
//! rows are stored top to bottom with no padding between them. A partial
//! block at the end of a row is padded with dark pixels.

mod dither;
mod render_target;

pub use dither::dither;
pub use render_target::RenderTarget;

use crate::protocol::{PixelFormat, PIXELS_PER_BLOCK};

/// Gray value to 2-bit level (top two bits)
#[inline]
pub fn quantize(gray: u8) -> u8 {
    gray >> 6
}

/// 2-bit level to the gray value the badge displays for it
///
/// The ramp is not linear: it approximates perceived brightness steps.
#[inline]
pub fn dequantize(level: u8) -> u8 {
    match level & 0x3 {
        0 => 0,
        1 => 127,
        2 => 191,
        _ => 255,
    }
}

/// Rec. 709 luma of an RGB color
#[inline]
pub fn to_gray(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 2126 + g as u32 * 7152 + b as u32 * 722) / 10_000) as u8
}

/// Packed buffer size for an image
#[inline]
pub fn packed_len(width: usize, height: usize, format: PixelFormat) -> usize {
    width.div_ceil(PIXELS_PER_BLOCK) * format.bytes_per_block() * height
}

/// Pack a 1 byte/pixel image into bit-planes
///
/// With `rotate` the packed image is turned 180 degrees.
pub fn pack(
    intermediate: &[u8],
    width: usize,
    height: usize,
    format: PixelFormat,
    rotate: bool,
    out: &mut [u8],
) {
    debug_assert_eq!(intermediate.len(), width * height);
    debug_assert_eq!(out.len(), packed_len(width, height, format));

    let blocks = width.div_ceil(PIXELS_PER_BLOCK);
    let per_block = format.bytes_per_block();
    let source = |x: usize, y: usize| {
        if rotate {
            intermediate[(height - 1 - y) * width + (width - 1 - x)]
        } else {
            intermediate[y * width + x]
        }
    };

    let mut o = 0;
    for y in 0..height {
        for block in 0..blocks {
            let mut plane0 = 0u8;
            let mut plane1 = 0u8;
            for i in 0..PIXELS_PER_BLOCK {
                let x = block * PIXELS_PER_BLOCK + i;
                if x >= width {
                    break;
                }
                let level = quantize(source(x, y));
                let bit = 7 - i;
                plane0 |= (level & 0x1) << bit;
                plane1 |= (level >> 1) << bit;
            }
            out[o] = plane0;
            if per_block == 2 {
                out[o + 1] = plane1;
            }
            o += per_block;
        }
    }
}

/// Inverse of [`pack`]
///
/// 1-bit pixels unpack to 0 or 255; 2-bit pixels to the `dequantize` ramp.
pub fn unpack(
    packed: &[u8],
    width: usize,
    height: usize,
    format: PixelFormat,
    rotate: bool,
    intermediate: &mut [u8],
) {
    debug_assert_eq!(intermediate.len(), width * height);
    debug_assert_eq!(packed.len(), packed_len(width, height, format));

    let blocks = width.div_ceil(PIXELS_PER_BLOCK);
    let per_block = format.bytes_per_block();

    let mut o = 0;
    for y in 0..height {
        for block in 0..blocks {
            let plane0 = packed[o];
            let plane1 = if per_block == 2 { packed[o + 1] } else { 0 };
            o += per_block;
            for i in 0..PIXELS_PER_BLOCK {
                let x = block * PIXELS_PER_BLOCK + i;
                if x >= width {
                    break;
                }
                let bit = 7 - i;
                let gray = match format {
                    PixelFormat::OneBit => {
                        if (plane0 >> bit) & 1 != 0 {
                            255
                        } else {
                            0
                        }
                    }
                    PixelFormat::TwoBits => {
                        dequantize(((plane0 >> bit) & 1) | (((plane1 >> bit) & 1) << 1))
                    }
                };
                let index = if rotate {
                    (height - 1 - y) * width + (width - 1 - x)
                } else {
                    y * width + x
                };
                intermediate[index] = gray;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quantize_ramp() {
        assert_eq!(quantize(0), 0);
        assert_eq!(quantize(63), 0);
        assert_eq!(quantize(64), 1);
        assert_eq!(quantize(200), 3);
        for level in 0..4 {
            assert_eq!(quantize(dequantize(level)), level);
        }
        assert_eq!(dequantize(1), 127);
        assert_eq!(dequantize(2), 191);
    }

    #[test]
    fn test_to_gray() {
        assert_eq!(to_gray(0, 0, 0), 0);
        assert_eq!(to_gray(255, 255, 255), 255);
        assert_eq!(to_gray(0, 255, 0), 182);
    }

    #[test]
    fn test_pack_bit_order() {
        // One row: first pixel full, the rest dark except the last at level 1
        let mut row = [0u8; 8];
        row[0] = 255;
        row[7] = 127;
        let mut out = [0u8; 2];
        pack(&row, 8, 1, PixelFormat::TwoBits, false, &mut out);
        assert_eq!(out, [0b1000_0001, 0b1000_0000]);

        let mut out = [0u8; 1];
        pack(&row, 8, 1, PixelFormat::OneBit, false, &mut out);
        assert_eq!(out, [0b1000_0001]);
    }

    #[test]
    fn test_pack_rotated_walks_backward() {
        let image: Vec<u8> = (0..16).map(|i| if i == 0 { 255 } else { 0 }).collect();
        let mut out = [0u8; 2];
        pack(&image, 16, 1, PixelFormat::OneBit, true, &mut out);
        // First source pixel ends up as the last bit of the last block
        assert_eq!(out, [0x00, 0x01]);
    }

    #[test]
    fn test_partial_block_padded_dark() {
        let image = vec![255u8; 12];
        let mut out = vec![0u8; packed_len(12, 1, PixelFormat::TwoBits)];
        pack(&image, 12, 1, PixelFormat::TwoBits, false, &mut out);
        assert_eq!(out, vec![0xFF, 0xFF, 0xF0, 0xF0]);
    }

    fn image_strategy(levels: &'static [u8]) -> impl Strategy<Value = (usize, usize, Vec<u8>)> {
        (1usize..=6, 1usize..=12).prop_flat_map(move |(blocks, height)| {
            let width = blocks * PIXELS_PER_BLOCK;
            (
                Just(width),
                Just(height),
                prop::collection::vec(prop::sample::select(levels), width * height),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_two_bit_roundtrip(
            (width, height, image) in image_strategy(&[0, 127, 191, 255]),
            rotate in any::<bool>(),
        ) {
            let mut packed = vec![0u8; packed_len(width, height, PixelFormat::TwoBits)];
            pack(&image, width, height, PixelFormat::TwoBits, rotate, &mut packed);
            let mut back = vec![0u8; width * height];
            unpack(&packed, width, height, PixelFormat::TwoBits, rotate, &mut back);
            prop_assert_eq!(back, image);
        }

        #[test]
        fn prop_one_bit_roundtrip(
            (width, height, image) in image_strategy(&[0, 255]),
            rotate in any::<bool>(),
        ) {
            let mut packed = vec![0u8; packed_len(width, height, PixelFormat::OneBit)];
            pack(&image, width, height, PixelFormat::OneBit, rotate, &mut packed);
            let mut back = vec![0u8; width * height];
            unpack(&packed, width, height, PixelFormat::OneBit, rotate, &mut back);
            prop_assert_eq!(back, image);
        }
    }
}
