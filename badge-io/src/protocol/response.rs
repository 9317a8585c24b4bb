//! Badge → host responses

use super::{
    ensure_len, header, nibbles, split_header, AckSource, ErrorCode, PixelFormat, SettingId,
    SettingReport,
};
use crate::error::{Error, Result};

/// Response opcodes (high nibble of the first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Ack = 0x0,
    Setting = 0x1,
    Pixels = 0x2,
    Memory = 0x3,
    Error = 0x4,
}

impl ResponseCode {
    pub fn from_header(byte: u8) -> Result<Self> {
        let (opcode, _) = split_header(byte);
        Ok(match opcode {
            0x0 => ResponseCode::Ack,
            0x1 => ResponseCode::Setting,
            0x2 => ResponseCode::Pixels,
            0x3 => ResponseCode::Memory,
            0x4 => ResponseCode::Error,
            other => return Err(Error::UnknownOpcode(other)),
        })
    }

    pub const fn min_len(self) -> usize {
        match self {
            ResponseCode::Ack => 2,
            ResponseCode::Setting => 1,
            ResponseCode::Pixels => 2,
            ResponseCode::Memory => 3,
            ResponseCode::Error => 2,
        }
    }

    /// Total message length; `buf` must hold at least `min_len` bytes
    pub fn full_len(self, buf: &[u8]) -> Result<usize> {
        ensure_len(buf, self.min_len())?;
        Ok(match self {
            ResponseCode::Setting => {
                let id = SettingId::try_from(split_header(buf[0]).1)?;
                1 + id.payload_len()
            }
            ResponseCode::Pixels => {
                let format = PixelFormat::from_bits(buf[0])?;
                let (w, h) = split_header(buf[1]);
                self.min_len() + w as usize * h as usize * format.bytes_per_block()
            }
            ResponseCode::Memory => {
                let dwords = (buf[0] & 0x0F) as usize + 1;
                self.min_len() + dwords * 4
            }
            ResponseCode::Ack | ResponseCode::Error => self.min_len(),
        })
    }
}

/// A decoded badge response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack { source: AckSource, cookie: u8 },
    Setting(SettingReport),
    /// Answer to ReadRect; `width` in blocks
    Pixels {
        format: PixelFormat,
        width: u8,
        height: u8,
        data: Vec<u8>,
    },
    /// Answer to ReadMemory
    Memory { address: u16, data: Vec<u8> },
    /// `cookie` is the packet id the error refers to (0 if none)
    Error { code: ErrorCode, cookie: u8 },
}

impl Response {
    pub fn code(&self) -> ResponseCode {
        match self {
            Response::Ack { .. } => ResponseCode::Ack,
            Response::Setting(_) => ResponseCode::Setting,
            Response::Pixels { .. } => ResponseCode::Pixels,
            Response::Memory { .. } => ResponseCode::Memory,
            Response::Error { .. } => ResponseCode::Error,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let op = self.code() as u8;
        match self {
            Response::Ack { source, cookie } => {
                out.extend_from_slice(&[header(op, (*source as u8) << 3), *cookie]);
            }
            Response::Setting(report) => {
                out.push(header(op, report.id() as u8));
                report.encode_payload(out);
            }
            Response::Pixels {
                format,
                width,
                height,
                data,
            } => {
                debug_assert_eq!(
                    data.len(),
                    *width as usize * *height as usize * format.bytes_per_block()
                );
                out.extend_from_slice(&[header(op, *format as u8), nibbles(*width, *height)]);
                out.extend_from_slice(data);
            }
            Response::Memory { address, data } => {
                debug_assert!(!data.is_empty() && data.len() % 4 == 0 && data.len() <= 64);
                let dwords = (data.len() / 4) as u8;
                out.push(header(op, dwords.wrapping_sub(1)));
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(data);
            }
            Response::Error { code, cookie } => {
                out.extend_from_slice(&[header(op, *code as u8), *cookie]);
            }
        }
    }

    /// Decode one response from the head of `buf`, returning it and the bytes consumed
    pub fn decode(buf: &[u8]) -> Result<(Response, usize)> {
        ensure_len(buf, 1)?;
        let code = ResponseCode::from_header(buf[0])?;
        let len = code.full_len(buf)?;
        ensure_len(buf, len)?;
        Ok((decode_as(code, &buf[..len])?, len))
    }
}

fn decode_as(code: ResponseCode, buf: &[u8]) -> Result<Response> {
    debug_assert_eq!(split_header(buf[0]).0, code as u8, "opcode mismatch");
    let low = buf[0] & 0x0F;
    Ok(match code {
        ResponseCode::Ack => Response::Ack {
            source: if low & 0x08 != 0 {
                AckSource::Ping
            } else {
                AckSource::PacketReceived
            },
            cookie: buf[1],
        },
        ResponseCode::Setting => {
            let id = SettingId::try_from(low)?;
            Response::Setting(SettingReport::decode_payload(id, &buf[1..])?)
        }
        ResponseCode::Pixels => {
            let (width, height) = split_header(buf[1]);
            Response::Pixels {
                format: PixelFormat::from_bits(low)?,
                width,
                height,
                data: buf[2..].to_vec(),
            }
        }
        ResponseCode::Memory => Response::Memory {
            address: u16::from_be_bytes([buf[1], buf[2]]),
            data: buf[3..].to_vec(),
        },
        ResponseCode::Error => Response::Error {
            code: ErrorCode::try_from(low)?,
            cookie: buf[1],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CapsReport, SettingUpdate};

    fn roundtrip(response: Response) {
        let mut buf = Vec::new();
        response.encode(&mut buf);
        let (decoded, used) = Response::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_ack_layout() {
        let mut buf = Vec::new();
        Response::Ack {
            source: AckSource::PacketReceived,
            cookie: 1,
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0x00, 0x01]);

        buf.clear();
        Response::Ack {
            source: AckSource::Ping,
            cookie: 7,
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0x08, 0x07]);
    }

    #[test]
    fn test_all_responses_roundtrip() {
        roundtrip(Response::Ack {
            source: AckSource::Ping,
            cookie: 3,
        });
        roundtrip(Response::Setting(SettingReport::Caps(CapsReport {
            version: 2,
            width: 36,
            height: 12,
            bits_per_pixel: 2,
            features: 0,
        })));
        roundtrip(Response::Setting(SettingReport::Value(
            SettingUpdate::AnimReadPos(77),
        )));
        roundtrip(Response::Setting(SettingReport::BufferFullness(200)));
        roundtrip(Response::Pixels {
            format: PixelFormat::TwoBits,
            width: 2,
            height: 3,
            data: vec![9; 12],
        });
        roundtrip(Response::Memory {
            address: 0x1000,
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        });
        roundtrip(Response::Error {
            code: ErrorCode::ReceiveBufferOverrun,
            cookie: 200,
        });
    }

    #[test]
    fn test_two_phase_lengths() {
        // Setting(Caps): header alone reveals the payload length
        assert_eq!(ResponseCode::Setting.full_len(&[0x19]).unwrap(), 6);
        // Pixels 1-bit 3x4
        assert_eq!(ResponseCode::Pixels.full_len(&[0x20, 0x34]).unwrap(), 14);
        // Memory with 2 dwords
        assert_eq!(ResponseCode::Memory.full_len(&[0x31, 0, 0]).unwrap(), 11);
        assert!(ResponseCode::Memory.full_len(&[0x31, 0]).is_err());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            Response::decode(&[0x90, 0x00]),
            Err(Error::UnknownOpcode(0x9))
        ));
        assert!(matches!(
            Response::decode(&[0x4F, 0x00]),
            Err(Error::UnknownErrorCode(0xF))
        ));
        assert!(matches!(
            Response::decode(&[0x1C]),
            Err(Error::UnknownSetting(0xC))
        ));
    }
}
