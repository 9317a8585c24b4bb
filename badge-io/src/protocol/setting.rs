//! Device settings
//!
//! Settings are addressed by a 4-bit id. The writable ones share one payload
//! encoding between `UpdateSetting` commands and `Setting` responses, so a
//! value read back from the badge decodes into the same `SettingUpdate` that
//! wrote it.

use super::{nibbles, AnimState, EndOfFadeAction, FadingAction};
use crate::error::{Error, Result};

/// Setting identifiers (low nibble of QuerySetting/UpdateSetting/Setting headers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingId {
    /// Overall LED output brightness
    Brightness = 0,
    /// Gray-scale hold timings between the bit-planes
    HoldTimings = 1,
    /// Idle timeout duration and behavior
    IdleTimeout = 2,
    FadeValue = 3,
    AnimBookmarkPos = 4,
    AnimReadPos = 5,
    AnimPlayState = 6,
    /// (read-only) button state
    ButtonState = 7,
    /// (read-only) receive buffer fill level
    BufferFullness = 8,
    /// (read-only) version, geometry and feature flags
    Caps = 9,
}

impl SettingId {
    /// Read-only settings can be queried but never updated
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            SettingId::ButtonState | SettingId::BufferFullness | SettingId::Caps
        )
    }

    /// Payload bytes following the header byte
    pub const fn payload_len(self) -> usize {
        match self {
            SettingId::Brightness => 1,
            SettingId::HoldTimings => 2,
            SettingId::IdleTimeout => 2,
            SettingId::FadeValue => 2,
            SettingId::AnimBookmarkPos => 2,
            SettingId::AnimReadPos => 2,
            SettingId::AnimPlayState => 1,
            SettingId::ButtonState => 1,
            SettingId::BufferFullness => 1,
            SettingId::Caps => 5,
        }
    }
}

impl TryFrom<u8> for SettingId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => SettingId::Brightness,
            1 => SettingId::HoldTimings,
            2 => SettingId::IdleTimeout,
            3 => SettingId::FadeValue,
            4 => SettingId::AnimBookmarkPos,
            5 => SettingId::AnimReadPos,
            6 => SettingId::AnimPlayState,
            7 => SettingId::ButtonState,
            8 => SettingId::BufferFullness,
            9 => SettingId::Caps,
            other => return Err(Error::UnknownSetting(other)),
        })
    }
}

/// A value for one of the writable settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingUpdate {
    Brightness(u8),
    /// Differential hold counts; effective levels are a, a+b, a+b+c (4 bits each)
    HoldTimings { a: u8, b: u8, c: u8 },
    /// Timeout 255 disables idle handling
    IdleTimeout {
        timeout: u8,
        fade: bool,
        end_of_fade: EndOfFadeAction,
    },
    FadeValue { value: u8, action: FadingAction },
    AnimBookmarkPos(i16),
    AnimReadPos(i16),
    AnimPlayState(AnimState),
}

impl SettingUpdate {
    pub fn id(&self) -> SettingId {
        match self {
            SettingUpdate::Brightness(_) => SettingId::Brightness,
            SettingUpdate::HoldTimings { .. } => SettingId::HoldTimings,
            SettingUpdate::IdleTimeout { .. } => SettingId::IdleTimeout,
            SettingUpdate::FadeValue { .. } => SettingId::FadeValue,
            SettingUpdate::AnimBookmarkPos(_) => SettingId::AnimBookmarkPos,
            SettingUpdate::AnimReadPos(_) => SettingId::AnimReadPos,
            SettingUpdate::AnimPlayState(_) => SettingId::AnimPlayState,
        }
    }

    /// Append the payload bytes (no header byte)
    pub fn encode_payload(&self, out: &mut Vec<u8>) {
        match *self {
            SettingUpdate::Brightness(level) => out.push(level),
            SettingUpdate::HoldTimings { a, b, c } => {
                out.push(nibbles(a, b));
                out.push((c & 0x0F) << 4);
            }
            SettingUpdate::IdleTimeout {
                timeout,
                fade,
                end_of_fade,
            } => {
                out.push(timeout);
                out.push(if fade { 0x80 } else { 0 } | ((end_of_fade as u8 & 0x3) << 5));
            }
            SettingUpdate::FadeValue { value, action } => {
                out.push(value);
                out.push((action as u8) << 6);
            }
            SettingUpdate::AnimBookmarkPos(pos) | SettingUpdate::AnimReadPos(pos) => {
                out.extend_from_slice(&pos.to_be_bytes());
            }
            SettingUpdate::AnimPlayState(state) => out.push(state as u8 & 0x3),
        }
    }

    /// Decode a payload for a writable setting id
    pub fn decode_payload(id: SettingId, payload: &[u8]) -> Result<Self> {
        super::ensure_len(payload, id.payload_len())?;
        Ok(match id {
            SettingId::Brightness => SettingUpdate::Brightness(payload[0]),
            SettingId::HoldTimings => SettingUpdate::HoldTimings {
                a: payload[0] >> 4,
                b: payload[0] & 0x0F,
                c: payload[1] >> 4,
            },
            SettingId::IdleTimeout => SettingUpdate::IdleTimeout {
                timeout: payload[0],
                fade: payload[1] & 0x80 != 0,
                end_of_fade: EndOfFadeAction::from_bits(payload[1] >> 5),
            },
            SettingId::FadeValue => SettingUpdate::FadeValue {
                value: payload[0],
                action: FadingAction::from_bits(payload[1] >> 6)?,
            },
            SettingId::AnimBookmarkPos => {
                SettingUpdate::AnimBookmarkPos(i16::from_be_bytes([payload[0], payload[1]]))
            }
            SettingId::AnimReadPos => {
                SettingUpdate::AnimReadPos(i16::from_be_bytes([payload[0], payload[1]]))
            }
            SettingId::AnimPlayState => SettingUpdate::AnimPlayState(AnimState::from_bits(payload[0])?),
            SettingId::ButtonState | SettingId::BufferFullness | SettingId::Caps => {
                return Err(Error::InvalidPacket(format!(
                    "setting {:?} is read-only",
                    id
                )))
            }
        })
    }
}

/// Button inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonState {
    pub button0: bool,
    pub button1: bool,
}

/// Raw capability record as reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapsReport {
    pub version: u8,
    pub width: u8,
    pub height: u8,
    pub bits_per_pixel: u8,
    pub features: u8,
}

/// A setting value echoed back by the badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingReport {
    /// One of the writable settings
    Value(SettingUpdate),
    ButtonState(ButtonState),
    /// Bytes waiting in the badge's 256-byte receive ring
    BufferFullness(u8),
    Caps(CapsReport),
}

impl SettingReport {
    pub fn id(&self) -> SettingId {
        match self {
            SettingReport::Value(update) => update.id(),
            SettingReport::ButtonState(_) => SettingId::ButtonState,
            SettingReport::BufferFullness(_) => SettingId::BufferFullness,
            SettingReport::Caps(_) => SettingId::Caps,
        }
    }

    pub fn encode_payload(&self, out: &mut Vec<u8>) {
        match *self {
            SettingReport::Value(update) => update.encode_payload(out),
            SettingReport::ButtonState(buttons) => {
                out.push(u8::from(buttons.button0) | (u8::from(buttons.button1) << 1));
            }
            SettingReport::BufferFullness(used) => out.push(used),
            SettingReport::Caps(caps) => out.extend_from_slice(&[
                caps.version,
                caps.width,
                caps.height,
                caps.bits_per_pixel,
                caps.features,
            ]),
        }
    }

    pub fn decode_payload(id: SettingId, payload: &[u8]) -> Result<Self> {
        super::ensure_len(payload, id.payload_len())?;
        Ok(match id {
            SettingId::ButtonState => SettingReport::ButtonState(ButtonState {
                button0: payload[0] & 0x1 != 0,
                button1: payload[0] & 0x2 != 0,
            }),
            SettingId::BufferFullness => SettingReport::BufferFullness(payload[0]),
            SettingId::Caps => SettingReport::Caps(CapsReport {
                version: payload[0],
                width: payload[1],
                height: payload[2],
                bits_per_pixel: payload[3],
                features: payload[4],
            }),
            writable => SettingReport::Value(SettingUpdate::decode_payload(writable, payload)?),
        })
    }
}
