//! Frame buffers owned by the frame pump

use super::{dither, pack, packed_len, unpack};
use crate::protocol::{DeviceCaps, PixelFormat, PIXELS_PER_BLOCK};

/// Grayscale drawing surface plus its packed device encoding
#[derive(Debug, Clone)]
pub struct RenderTarget {
    width: usize,
    height: usize,
    format: PixelFormat,
    /// One gray byte per pixel, row-major
    pub intermediate: Vec<u8>,
    packed: Vec<u8>,
}

impl RenderTarget {
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            intermediate: vec![0; width * height],
            packed: vec![0; packed_len(width, height, format)],
        }
    }

    /// Sized for a device
    pub fn for_caps(caps: &DeviceCaps) -> Self {
        Self::new(caps.width as usize, caps.height as usize, caps.pixel_format())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width_in_blocks(&self) -> usize {
        self.width.div_ceil(PIXELS_PER_BLOCK)
    }

    /// True if this target already matches the device geometry and format
    pub fn same_dimensions(&self, caps: &DeviceCaps) -> bool {
        self.width == caps.width as usize
            && self.height == caps.height as usize
            && self.format == caps.pixel_format()
    }

    /// Output of the last `pack`
    pub fn packed(&self) -> &[u8] {
        &self.packed
    }

    pub fn clear(&mut self) {
        self.intermediate.fill(0);
    }

    /// Gray value at (x, y); out of range reads are dark
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        if x < self.width && y < self.height {
            self.intermediate[y * self.width + x]
        } else {
            0
        }
    }

    /// Out of range writes are ignored
    pub fn set_pixel(&mut self, x: usize, y: usize, gray: u8) {
        if x < self.width && y < self.height {
            self.intermediate[y * self.width + x] = gray;
        }
    }

    pub fn dither(&mut self) {
        dither(&mut self.intermediate, self.width, self.height);
    }

    pub fn pack(&mut self, rotate: bool) {
        pack(
            &self.intermediate,
            self.width,
            self.height,
            self.format,
            rotate,
            &mut self.packed,
        );
    }

    /// Load a packed frame (e.g. a Pixels response) back into the gray buffer
    pub fn unpack_from(&mut self, packed: &[u8], rotate: bool) {
        unpack(
            packed,
            self.width,
            self.height,
            self.format,
            rotate,
            &mut self.intermediate,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DevicePreset;

    #[test]
    fn test_buffer_sizes() {
        let target = RenderTarget::for_caps(&DevicePreset::B1236.caps());
        assert_eq!(target.intermediate.len(), 36 * 12);
        assert_eq!(target.packed().len(), 5 * 2 * 12);
        assert_eq!(target.width_in_blocks(), 5);

        let one_bit = RenderTarget::new(20, 3, PixelFormat::OneBit);
        assert_eq!(one_bit.packed().len(), 3 * 3);
    }

    #[test]
    fn test_same_dimensions() {
        let b1248 = DevicePreset::B1248.caps();
        let target = RenderTarget::for_caps(&b1248);
        assert!(target.same_dimensions(&b1248));
        assert!(!target.same_dimensions(&DevicePreset::B1236.caps()));
        let one_bit = DeviceCaps {
            bits_per_pixel: 1,
            ..b1248
        };
        assert!(!target.same_dimensions(&one_bit));
    }

    #[test]
    fn test_pack_and_unpack() {
        let mut target = RenderTarget::new(16, 2, PixelFormat::TwoBits);
        target.set_pixel(0, 0, 255);
        target.set_pixel(15, 1, 191);
        target.set_pixel(99, 99, 255);
        target.pack(false);
        let packed = target.packed().to_vec();
        assert_eq!(packed[0], 0x80);
        assert_eq!(packed[1], 0x80);

        target.clear();
        target.unpack_from(&packed, false);
        assert_eq!(target.pixel(0, 0), 255);
        assert_eq!(target.pixel(15, 1), 191);
        assert_eq!(target.pixel(1, 0), 0);
    }
}
