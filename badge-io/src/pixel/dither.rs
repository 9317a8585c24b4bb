//! Stucki error diffusion

use super::{dequantize, quantize};

/// (dx, dy, weight) over a divisor of 42
const STUCKI: [(isize, isize, i32); 12] = [
    (1, 0, 8),
    (2, 0, 4),
    (-2, 1, 2),
    (-1, 1, 4),
    (0, 1, 8),
    (1, 1, 4),
    (2, 1, 2),
    (-2, 2, 1),
    (-1, 2, 2),
    (0, 2, 4),
    (1, 2, 2),
    (2, 2, 1),
];

/// Dither a 1 byte/pixel image in place to the four badge gray levels
///
/// Single pass in raster order. Each pixel is replaced by its displayable
/// value first, then its rounding error is spread to unvisited neighbours.
/// Errors are carried in 22.10 fixed point.
pub fn dither(image: &mut [u8], width: usize, height: usize) {
    debug_assert_eq!(image.len(), width * height);

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let value = image[index] as i32;
            let rounded = dequantize(quantize(image[index]));
            image[index] = rounded;

            let error = value - rounded as i32;
            if error == 0 {
                continue;
            }
            let scaled = (error << 10) / 42;

            for &(dx, dy, weight) in STUCKI.iter() {
                let ex = x as isize + dx;
                let ey = y as isize + dy;
                if ex < 0 || ex >= width as isize || ey >= height as isize {
                    continue;
                }
                let target = ey as usize * width + ex as usize;
                let diffused = image[target] as i32 + ((scaled * weight) >> 10);
                image[target] = diffused.clamp(0, 255) as u8;
            }
        }
    }
}
