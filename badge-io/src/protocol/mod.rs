//! Badge wire codec
//!
//! Every message starts with a header byte whose high nibble is the opcode.
//! The low nibble and the following bytes hold opcode-specific fields:
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! ┌───────────────┬───────────────┐
//! │    opcode     │  field bits   │  byte 0
//! └───────────────┴───────────────┘
//!   byte 1..n: opcode-specific (coordinates, cookies, payload)
//! ```
//!
//! Decoding is two-phase. `min_len` says how many bytes must be buffered
//! before the header can be inspected at all; `full_len` then reads header
//! fields (rect size, dword count, setting id) to get the true length of
//! variable-size messages. The link uses this to carve responses out of the
//! receive stream and to split command batches on message boundaries.
//!
//! Malformed bytes surface as `Err`; skipping and resynchronizing is the
//! link's job, not the codec's.

mod batch;
mod caps;
mod command;
mod response;
mod setting;

pub use batch::split_batch;
pub use caps::{DeviceCaps, DevicePreset, Features, PROTOCOL_VERSION};
pub use command::{Command, CommandCode};
pub use response::{Response, ResponseCode};
pub use setting::{ButtonState, CapsReport, SettingId, SettingReport, SettingUpdate};

use crate::error::{Error, Result};

/// Pixels packed into one block (one byte per bit-plane)
pub const PIXELS_PER_BLOCK: usize = 8;

/// Largest x, y, width or height a 4-bit rect field can hold
pub const MAX_RECT_EXTENT: usize = 0x0F;

/// Split a header byte into (opcode, low nibble)
#[inline]
pub(crate) fn split_header(byte: u8) -> (u8, u8) {
    (byte >> 4, byte & 0x0F)
}

/// Build a header byte from opcode and low nibble
#[inline]
pub(crate) fn header(opcode: u8, low: u8) -> u8 {
    (opcode << 4) | (low & 0x0F)
}

/// Pack two 4-bit values into one byte (first in the high nibble)
#[inline]
pub(crate) fn nibbles(high: u8, low: u8) -> u8 {
    ((high & 0x0F) << 4) | (low & 0x0F)
}

pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Device-side draw buffer addressed by rect commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Not displayed; drawing here does not flicker
    #[default]
    BackBuffer = 0,
    /// Currently scanned out to the LEDs
    FrontBuffer = 1,
}

impl Target {
    pub(crate) fn from_bits(bits: u8) -> Result<Self> {
        match bits & 0x3 {
            0 => Ok(Target::BackBuffer),
            1 => Ok(Target::FrontBuffer),
            other => Err(Error::InvalidPacket(format!("bad target buffer {}", other))),
        }
    }
}

/// Packed pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// One bit-plane per block
    OneBit = 0,
    /// Two bit-planes per block
    #[default]
    TwoBits = 1,
}

impl PixelFormat {
    /// Bytes per 8-pixel block
    #[inline]
    pub const fn bytes_per_block(self) -> usize {
        match self {
            PixelFormat::OneBit => 1,
            PixelFormat::TwoBits => 2,
        }
    }

    /// Gray levels one pixel can show
    pub const fn color_values(self) -> usize {
        match self {
            PixelFormat::OneBit => 2,
            PixelFormat::TwoBits => 4,
        }
    }

    /// Format for a device bit depth (anything but 1 is treated as 2-bit)
    pub const fn from_bit_depth(bits_per_pixel: u8) -> Self {
        if bits_per_pixel == 1 {
            PixelFormat::OneBit
        } else {
            PixelFormat::TwoBits
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Result<Self> {
        match bits & 0x3 {
            0 => Ok(PixelFormat::OneBit),
            1 => Ok(PixelFormat::TwoBits),
            other => Err(Error::InvalidPacket(format!("bad pixel format {}", other))),
        }
    }
}

/// Animation playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimState {
    #[default]
    Stopped = 0,
    Playing = 1,
    SingleStepping = 2,
}

impl AnimState {
    pub(crate) fn from_bits(bits: u8) -> Result<Self> {
        match bits & 0x3 {
            0 => Ok(AnimState::Stopped),
            1 => Ok(AnimState::Playing),
            2 => Ok(AnimState::SingleStepping),
            other => Err(Error::InvalidPacket(format!("bad anim state {}", other))),
        }
    }
}

/// Fade direction for the FadeValue setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadingAction {
    #[default]
    None = 0,
    In = 1,
    Out = 2,
}

impl FadingAction {
    pub(crate) fn from_bits(bits: u8) -> Result<Self> {
        match bits & 0x3 {
            0 => Ok(FadingAction::None),
            1 => Ok(FadingAction::In),
            2 => Ok(FadingAction::Out),
            other => Err(Error::InvalidPacket(format!("bad fading action {}", other))),
        }
    }
}

/// What the badge does once an idle fade completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfFadeAction {
    #[default]
    None = 0,
    Clear = 1,
    RestartAnim = 2,
    ResumeAnim = 3,
}

impl EndOfFadeAction {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => EndOfFadeAction::None,
            1 => EndOfFadeAction::Clear,
            2 => EndOfFadeAction::RestartAnim,
            _ => EndOfFadeAction::ResumeAnim,
        }
    }
}

/// Origin of an Ack response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckSource {
    /// Acknowledges a framed packet; cookie is the packet id
    PacketReceived = 0,
    /// Answers a Ping command; cookie is the ping cookie
    Ping = 1,
}

/// Error codes reported by the badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    CorruptPacketHeader = 1,
    CorruptPacketData = 2,
    ReceiveBufferOverrun = 3,
    EepromWriteOutOfBounds = 4,
    BadSerialCommand = 5,
    BadAnimCommand = 6,
}

impl ErrorCode {
    /// Errors the link answers by resending the referenced packet
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCode::CorruptPacketData | ErrorCode::ReceiveBufferOverrun
        )
    }

    /// Errors after which the firmware waits for a run of sync bytes
    pub fn needs_resync(self) -> bool {
        matches!(
            self,
            ErrorCode::BadSerialCommand | ErrorCode::ReceiveBufferOverrun
        )
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => ErrorCode::Ok,
            1 => ErrorCode::CorruptPacketHeader,
            2 => ErrorCode::CorruptPacketData,
            3 => ErrorCode::ReceiveBufferOverrun,
            4 => ErrorCode::EepromWriteOutOfBounds,
            5 => ErrorCode::BadSerialCommand,
            6 => ErrorCode::BadAnimCommand,
            other => return Err(Error::UnknownErrorCode(other)),
        })
    }
}
