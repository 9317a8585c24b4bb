//! Host → badge commands

use super::{
    ensure_len, header, nibbles, split_header, AnimState, PixelFormat, SettingId, SettingUpdate,
    Target,
};
use crate::error::{Error, Result};

/// Command opcodes (high nibble of the first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Ping = 0x0,
    QuerySetting = 0x1,
    UpdateSetting = 0x2,
    Swap = 0x3,
    ReadRect = 0x4,
    WriteRect = 0x5,
    CopyRect = 0x6,
    FillRect = 0x7,
    ReadMemory = 0x8,
    WriteMemory = 0x9,
    PlayFromBookmark = 0xA,
}

impl CommandCode {
    /// Opcode of the message starting with `byte`
    pub fn from_header(byte: u8) -> Result<Self> {
        let (opcode, _) = split_header(byte);
        Ok(match opcode {
            0x0 => CommandCode::Ping,
            0x1 => CommandCode::QuerySetting,
            0x2 => CommandCode::UpdateSetting,
            0x3 => CommandCode::Swap,
            0x4 => CommandCode::ReadRect,
            0x5 => CommandCode::WriteRect,
            0x6 => CommandCode::CopyRect,
            0x7 => CommandCode::FillRect,
            0x8 => CommandCode::ReadMemory,
            0x9 => CommandCode::WriteMemory,
            0xA => CommandCode::PlayFromBookmark,
            other => return Err(Error::UnknownOpcode(other)),
        })
    }

    /// Bytes needed before `full_len` can inspect the header
    pub const fn min_len(self) -> usize {
        match self {
            CommandCode::Ping => 2,
            CommandCode::QuerySetting => 2,
            CommandCode::UpdateSetting => 2,
            CommandCode::Swap => 2,
            CommandCode::ReadRect => 3,
            CommandCode::WriteRect => 3,
            CommandCode::CopyRect => 4,
            CommandCode::FillRect => 5,
            CommandCode::ReadMemory => 3,
            CommandCode::WriteMemory => 3,
            CommandCode::PlayFromBookmark => 3,
        }
    }

    /// Total message length; `buf` must hold at least `min_len` bytes
    pub fn full_len(self, buf: &[u8]) -> Result<usize> {
        ensure_len(buf, self.min_len())?;
        Ok(match self {
            CommandCode::UpdateSetting => {
                let id = SettingId::try_from(split_header(buf[0]).1)?;
                if id.is_read_only() {
                    return Err(Error::InvalidPacket(format!(
                        "update of read-only setting {:?}",
                        id
                    )));
                }
                1 + id.payload_len()
            }
            CommandCode::WriteRect => {
                let format = PixelFormat::from_bits(buf[0])?;
                let (w, h) = split_header(buf[2]);
                self.min_len() + w as usize * h as usize * format.bytes_per_block()
            }
            CommandCode::WriteMemory => {
                let dwords = (buf[0] & 0x0F) as usize + 1;
                self.min_len() + dwords * 4
            }
            _ => self.min_len(),
        })
    }
}

/// A single badge command
///
/// Rect `x` and `width` are in 8-pixel blocks; `y` and `height` in rows.
/// All rect fields are 4 bits wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Badge answers with Ack(Ping, cookie); cookie is 4 bits
    Ping { cookie: u8 },
    QuerySetting(SettingId),
    UpdateSetting(SettingUpdate),
    /// Promote the back buffer to the front buffer
    Swap { bookmark: bool, hold_frames: u8 },
    ReadRect {
        target: Target,
        format: PixelFormat,
        x: u8,
        y: u8,
        width: u8,
        height: u8,
    },
    WriteRect {
        target: Target,
        format: PixelFormat,
        x: u8,
        y: u8,
        width: u8,
        height: u8,
        data: Vec<u8>,
    },
    CopyRect {
        src: Target,
        dst: Target,
        src_x: u8,
        src_y: u8,
        dst_x: u8,
        dst_y: u8,
        width: u8,
        height: u8,
    },
    FillRect {
        target: Target,
        x: u8,
        y: u8,
        width: u8,
        height: u8,
        value: u16,
    },
    /// Read 1..=16 dwords of EEPROM
    ReadMemory { address: u16, dwords: u8 },
    /// Write `data.len() / 4` dwords (1..=16) of EEPROM
    WriteMemory { address: u16, data: Vec<u8> },
    PlayFromBookmark {
        state: AnimState,
        bookmark: Option<i16>,
    },
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::Ping { .. } => CommandCode::Ping,
            Command::QuerySetting(_) => CommandCode::QuerySetting,
            Command::UpdateSetting(_) => CommandCode::UpdateSetting,
            Command::Swap { .. } => CommandCode::Swap,
            Command::ReadRect { .. } => CommandCode::ReadRect,
            Command::WriteRect { .. } => CommandCode::WriteRect,
            Command::CopyRect { .. } => CommandCode::CopyRect,
            Command::FillRect { .. } => CommandCode::FillRect,
            Command::ReadMemory { .. } => CommandCode::ReadMemory,
            Command::WriteMemory { .. } => CommandCode::WriteMemory,
            Command::PlayFromBookmark { .. } => CommandCode::PlayFromBookmark,
        }
    }

    /// WriteRect covering a whole frame at the origin of the back buffer
    pub fn write_frame(format: PixelFormat, width_in_blocks: u8, height: u8, data: Vec<u8>) -> Self {
        Command::WriteRect {
            target: Target::BackBuffer,
            format,
            x: 0,
            y: 0,
            width: width_in_blocks,
            height,
            data,
        }
    }

    /// Append the wire encoding to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        let op = self.code() as u8;
        match self {
            Command::Ping { cookie } => out.extend_from_slice(&[header(op, *cookie), 0x00]),
            Command::QuerySetting(id) => out.extend_from_slice(&[header(op, *id as u8), 0x00]),
            Command::UpdateSetting(update) => {
                out.push(header(op, update.id() as u8));
                update.encode_payload(out);
            }
            Command::Swap {
                bookmark,
                hold_frames,
            } => {
                out.push(header(op, u8::from(*bookmark) << 3));
                out.push(*hold_frames);
            }
            Command::ReadRect {
                target,
                format,
                x,
                y,
                width,
                height,
            } => out.extend_from_slice(&[
                header(op, ((*target as u8) << 2) | *format as u8),
                nibbles(*x, *y),
                nibbles(*width, *height),
            ]),
            Command::WriteRect {
                target,
                format,
                x,
                y,
                width,
                height,
                data,
            } => {
                debug_assert_eq!(
                    data.len(),
                    *width as usize * *height as usize * format.bytes_per_block()
                );
                out.extend_from_slice(&[
                    header(op, ((*target as u8) << 2) | *format as u8),
                    nibbles(*x, *y),
                    nibbles(*width, *height),
                ]);
                out.extend_from_slice(data);
            }
            Command::CopyRect {
                src,
                dst,
                src_x,
                src_y,
                dst_x,
                dst_y,
                width,
                height,
            } => out.extend_from_slice(&[
                header(op, ((*src as u8) << 2) | *dst as u8),
                nibbles(*src_x, *src_y),
                nibbles(*dst_x, *dst_y),
                nibbles(*width, *height),
            ]),
            Command::FillRect {
                target,
                x,
                y,
                width,
                height,
                value,
            } => {
                out.extend_from_slice(&[
                    header(op, (*target as u8) << 2),
                    nibbles(*x, *y),
                    nibbles(*width, *height),
                ]);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Command::ReadMemory { address, dwords } => {
                debug_assert!((1..=16).contains(dwords));
                out.push(header(op, dwords.wrapping_sub(1)));
                out.extend_from_slice(&address.to_be_bytes());
            }
            Command::WriteMemory { address, data } => {
                debug_assert!(!data.is_empty() && data.len() % 4 == 0 && data.len() <= 64);
                let dwords = (data.len() / 4) as u8;
                out.push(header(op, dwords.wrapping_sub(1)));
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(data);
            }
            Command::PlayFromBookmark { state, bookmark } => {
                let has = u8::from(bookmark.is_some()) << 3;
                out.push(header(op, has | *state as u8));
                out.extend_from_slice(&bookmark.unwrap_or(0).to_be_bytes());
            }
        }
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::UpdateSetting(update) => 1 + update.id().payload_len(),
            Command::WriteRect { data, .. } | Command::WriteMemory { data, .. } => {
                self.code().min_len() + data.len()
            }
            _ => self.code().min_len(),
        }
    }

    /// Decode one command from the head of `buf`, returning it and the bytes consumed
    pub fn decode(buf: &[u8]) -> Result<(Command, usize)> {
        ensure_len(buf, 1)?;
        let code = CommandCode::from_header(buf[0])?;
        let len = code.full_len(buf)?;
        ensure_len(buf, len)?;
        Ok((decode_as(code, &buf[..len])?, len))
    }
}

/// Decode a complete message already known to carry `code`
fn decode_as(code: CommandCode, buf: &[u8]) -> Result<Command> {
    debug_assert_eq!(split_header(buf[0]).0, code as u8, "opcode mismatch");
    let low = buf[0] & 0x0F;
    Ok(match code {
        CommandCode::Ping => Command::Ping { cookie: low },
        CommandCode::QuerySetting => Command::QuerySetting(SettingId::try_from(low)?),
        CommandCode::UpdateSetting => {
            let id = SettingId::try_from(low)?;
            Command::UpdateSetting(SettingUpdate::decode_payload(id, &buf[1..])?)
        }
        CommandCode::Swap => Command::Swap {
            bookmark: low & 0x08 != 0,
            hold_frames: buf[1],
        },
        CommandCode::ReadRect | CommandCode::WriteRect => {
            let target = Target::from_bits(low >> 2)?;
            let format = PixelFormat::from_bits(low)?;
            let (x, y) = split_header(buf[1]);
            let (width, height) = split_header(buf[2]);
            if code == CommandCode::ReadRect {
                Command::ReadRect {
                    target,
                    format,
                    x,
                    y,
                    width,
                    height,
                }
            } else {
                Command::WriteRect {
                    target,
                    format,
                    x,
                    y,
                    width,
                    height,
                    data: buf[3..].to_vec(),
                }
            }
        }
        CommandCode::CopyRect => {
            let (src_x, src_y) = split_header(buf[1]);
            let (dst_x, dst_y) = split_header(buf[2]);
            let (width, height) = split_header(buf[3]);
            Command::CopyRect {
                src: Target::from_bits(low >> 2)?,
                dst: Target::from_bits(low)?,
                src_x,
                src_y,
                dst_x,
                dst_y,
                width,
                height,
            }
        }
        CommandCode::FillRect => {
            let (x, y) = split_header(buf[1]);
            let (width, height) = split_header(buf[2]);
            Command::FillRect {
                target: Target::from_bits(low >> 2)?,
                x,
                y,
                width,
                height,
                value: u16::from_be_bytes([buf[3], buf[4]]),
            }
        }
        CommandCode::ReadMemory => Command::ReadMemory {
            address: u16::from_be_bytes([buf[1], buf[2]]),
            dwords: low + 1,
        },
        CommandCode::WriteMemory => Command::WriteMemory {
            address: u16::from_be_bytes([buf[1], buf[2]]),
            data: buf[3..].to_vec(),
        },
        CommandCode::PlayFromBookmark => Command::PlayFromBookmark {
            state: AnimState::from_bits(low)?,
            bookmark: (low & 0x08 != 0).then(|| i16::from_be_bytes([buf[1], buf[2]])),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EndOfFadeAction, FadingAction};

    fn roundtrip(cmd: Command) {
        let mut buf = Vec::new();
        cmd.encode(&mut buf);
        assert_eq!(buf.len(), cmd.encoded_len(), "{:?}", cmd);
        let (decoded, used) = Command::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn test_ping_layout() {
        let mut buf = Vec::new();
        Command::Ping { cookie: 7 }.encode(&mut buf);
        assert_eq!(buf, vec![0x07, 0x00]);
    }

    #[test]
    fn test_query_caps_layout() {
        let mut buf = Vec::new();
        Command::QuerySetting(SettingId::Caps).encode(&mut buf);
        assert_eq!(buf, vec![0x19, 0x00]);
    }

    #[test]
    fn test_write_rect_layout() {
        let mut buf = Vec::new();
        Command::WriteRect {
            target: Target::FrontBuffer,
            format: PixelFormat::OneBit,
            x: 1,
            y: 2,
            width: 2,
            height: 1,
            data: vec![0xAA, 0x55],
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0x54, 0x12, 0x21, 0xAA, 0x55]);
    }

    #[test]
    fn test_all_commands_roundtrip() {
        roundtrip(Command::Ping { cookie: 0xF });
        roundtrip(Command::QuerySetting(SettingId::BufferFullness));
        roundtrip(Command::UpdateSetting(SettingUpdate::Brightness(9)));
        roundtrip(Command::UpdateSetting(SettingUpdate::IdleTimeout {
            timeout: 255,
            fade: false,
            end_of_fade: EndOfFadeAction::Clear,
        }));
        roundtrip(Command::UpdateSetting(SettingUpdate::FadeValue {
            value: 3,
            action: FadingAction::In,
        }));
        roundtrip(Command::Swap {
            bookmark: true,
            hold_frames: 12,
        });
        roundtrip(Command::ReadRect {
            target: Target::FrontBuffer,
            format: PixelFormat::TwoBits,
            x: 1,
            y: 3,
            width: 4,
            height: 5,
        });
        roundtrip(Command::write_frame(
            PixelFormat::TwoBits,
            6,
            12,
            (0..144).map(|i| i as u8).collect(),
        ));
        roundtrip(Command::CopyRect {
            src: Target::FrontBuffer,
            dst: Target::BackBuffer,
            src_x: 1,
            src_y: 2,
            dst_x: 3,
            dst_y: 4,
            width: 5,
            height: 6,
        });
        roundtrip(Command::FillRect {
            target: Target::BackBuffer,
            x: 0,
            y: 0,
            width: 6,
            height: 12,
            value: 0xFFFF,
        });
        roundtrip(Command::ReadMemory {
            address: 0x0120,
            dwords: 16,
        });
        roundtrip(Command::WriteMemory {
            address: 0x00FE,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        });
        roundtrip(Command::PlayFromBookmark {
            state: AnimState::Playing,
            bookmark: Some(-300),
        });
        roundtrip(Command::PlayFromBookmark {
            state: AnimState::Stopped,
            bookmark: None,
        });
    }

    #[test]
    fn test_decode_needs_whole_message() {
        let mut buf = Vec::new();
        Command::write_frame(PixelFormat::OneBit, 2, 2, vec![0; 4]).encode(&mut buf);
        assert_eq!(CommandCode::WriteRect.full_len(&buf).unwrap(), 7);
        assert!(matches!(
            Command::decode(&buf[..5]),
            Err(Error::Truncated {
                needed: 7,
                available: 5
            })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_and_read_only() {
        assert!(matches!(
            Command::decode(&[0xF0, 0x00]),
            Err(Error::UnknownOpcode(0xF))
        ));
        // UpdateSetting(Caps)
        assert!(Command::decode(&[0x29, 1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn test_decode_consumes_one_of_many() {
        let mut buf = Vec::new();
        Command::Ping { cookie: 1 }.encode(&mut buf);
        Command::QuerySetting(SettingId::Brightness).encode(&mut buf);
        let (first, used) = Command::decode(&buf).unwrap();
        assert_eq!(first, Command::Ping { cookie: 1 });
        let (second, _) = Command::decode(&buf[used..]).unwrap();
        assert_eq!(second, Command::QuerySetting(SettingId::Brightness));
    }
}
