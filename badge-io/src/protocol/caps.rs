//! Device capabilities and well-known badge presets

use serde::{Deserialize, Serialize};

use super::{CapsReport, PixelFormat, MAX_RECT_EXTENT, PIXELS_PER_BLOCK};

/// Protocol version spoken by this crate and reported by current firmware
pub const PROTOCOL_VERSION: u8 = 1;

/// Optional hardware feature bits from the Caps setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Features(pub u8);

impl Features {
    pub const NONE: Features = Features(0);
    /// Fine grained PWM brightness
    pub const HARDWARE_BRIGHTNESS: Features = Features(0x01);

    #[inline]
    pub fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Geometry and feature snapshot of a connected badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    pub version: u8,
    /// Pixels across
    pub width: u8,
    /// Pixels tall
    pub height: u8,
    /// Bits per pixel in the packed buffer
    pub bits_per_pixel: u8,
    pub features: Features,
    /// Link rate the badge is running at
    pub baud: u32,
}

impl DeviceCaps {
    /// Build from a Caps setting response received over a link running at `baud`
    pub fn from_report(report: &CapsReport, baud: u32) -> Self {
        Self {
            version: report.version,
            width: report.width,
            height: report.height,
            bits_per_pixel: report.bits_per_pixel,
            features: Features(report.features),
            baud,
        }
    }

    /// The record a badge with these caps reports over the wire
    pub fn report(&self) -> CapsReport {
        CapsReport {
            version: self.version,
            width: self.width,
            height: self.height,
            bits_per_pixel: self.bits_per_pixel,
            features: self.features.0,
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::from_bit_depth(self.bits_per_pixel)
    }

    /// Distinct gray levels a pixel can show in the packed format
    pub fn color_values(&self) -> usize {
        self.pixel_format().color_values()
    }

    /// True if a whole frame fits the 4-bit size fields of one WriteRect
    pub fn fits_write_rect(&self) -> bool {
        self.width_in_blocks() <= MAX_RECT_EXTENT && usize::from(self.height) <= MAX_RECT_EXTENT
    }

    /// 8-pixel blocks per row
    pub fn width_in_blocks(&self) -> usize {
        (self.width as usize).div_ceil(PIXELS_PER_BLOCK)
    }

    pub fn bytes_per_block(&self) -> usize {
        self.pixel_format().bytes_per_block()
    }

    /// Packed bytes per row
    pub fn frame_stride(&self) -> usize {
        self.width_in_blocks() * self.bytes_per_block()
    }

    /// Packed bytes per full frame
    pub fn frame_size(&self) -> usize {
        self.frame_stride() * self.height as usize
    }

    /// Bytes per row of the 1 byte/pixel intermediate buffer
    pub fn intermediate_stride(&self) -> usize {
        self.width as usize
    }

    pub fn intermediate_size(&self) -> usize {
        self.intermediate_stride() * self.height as usize
    }

    pub fn has_hardware_brightness(&self) -> bool {
        self.features.contains(Features::HARDWARE_BRIGHTNESS)
    }
}

/// Well-known badges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreset {
    /// 36x12, 2 bits per pixel, software brightness only
    B1236,
    /// 48x12, 2 bits per pixel, hardware brightness
    #[default]
    B1248,
}

impl DevicePreset {
    pub fn caps(self) -> DeviceCaps {
        match self {
            DevicePreset::B1236 => DeviceCaps {
                version: PROTOCOL_VERSION,
                width: 36,
                height: 12,
                bits_per_pixel: 2,
                features: Features::NONE,
                baud: 38_400,
            },
            DevicePreset::B1248 => DeviceCaps {
                version: PROTOCOL_VERSION,
                width: 48,
                height: 12,
                bits_per_pixel: 2,
                features: Features::HARDWARE_BRIGHTNESS,
                baud: 115_200,
            },
        }
    }

    pub fn baud(self) -> u32 {
        self.caps().baud
    }
}
