//! Packet framing
//!
//! ```text
//! ┌──────┬────────┬────────┬──────────┬──────────┬────────┬─────────────────┐
//! │ 0xA5 │ cookie │ length │ crc16 lo │ crc16 hi │  crc8  │ payload[length] │
//! └──────┴────────┴────────┴──────────┴──────────┴────────┴─────────────────┘
//! ```
//!
//! - cookie: packet id, 0 when no acknowledgment is wanted
//! - crc16: CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF) over the payload
//! - crc8: poly 0x07 seeded with 0xA5, over bytes 1..=4 of the header

use crc::{Algorithm, Crc, CRC_16_IBM_3740};

use crate::error::{Error, Result};

/// First byte of every packet
pub const SYNC_BYTE: u8 = 0xA5;

pub const HEADER_LEN: usize = 6;

/// One length byte limits a packet to this many payload bytes
pub const MAX_PAYLOAD: usize = 255;

/// Run of 0xFF written to flush a partially parsed packet out of the badge
pub const SYNC_RUN_LEN: usize = 256;

/// Header checksum: CRC-8 poly 0x07 with the sync byte as initial value
const CRC_8_BADGE_HEADER: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: SYNC_BYTE,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x57,
    residue: 0x00,
};

const PAYLOAD_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
const HEADER_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_BADGE_HEADER);

#[inline]
pub fn crc16(payload: &[u8]) -> u16 {
    PAYLOAD_CRC.checksum(payload)
}

#[inline]
pub fn crc8(bytes: &[u8]) -> u8 {
    HEADER_CRC.checksum(bytes)
}

/// Build the 6-byte header for `payload`
pub fn encode_header(cookie: u8, payload: &[u8]) -> Result<[u8; HEADER_LEN]> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let [lo, hi] = crc16(payload).to_le_bytes();
    let len = payload.len() as u8;
    Ok([
        SYNC_BYTE,
        cookie,
        len,
        lo,
        hi,
        crc8(&[cookie, len, lo, hi]),
    ])
}

/// Header + payload as one buffer
pub fn encode_frame(cookie: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let header = encode_header(cookie, payload)?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// A validated packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub cookie: u8,
    pub len: u8,
    pub crc16: u16,
}

impl FrameHeader {
    /// Parse and check sync byte and header checksum
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }
        if bytes[0] != SYNC_BYTE {
            return Err(Error::InvalidPacket(format!(
                "bad sync byte {:#04x}",
                bytes[0]
            )));
        }
        let expected = crc8(&bytes[1..5]);
        if bytes[5] != expected {
            return Err(Error::InvalidPacket(format!(
                "header crc mismatch: got {:#04x}, expected {:#04x}",
                bytes[5], expected
            )));
        }
        Ok(Self {
            cookie: bytes[1],
            len: bytes[2],
            crc16: u16::from_le_bytes([bytes[3], bytes[4]]),
        })
    }

    pub fn payload_matches(&self, payload: &[u8]) -> bool {
        payload.len() == self.len as usize && crc16(payload) == self.crc16
    }
}

/// Pull every well-formed packet out of a captured byte stream
///
/// Sync runs and other bytes that do not start a valid header are skipped.
/// A trailing partial packet is ignored.
pub fn split_frames(stream: &[u8]) -> Vec<(FrameHeader, Vec<u8>)> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos + HEADER_LEN <= stream.len() {
        let header = match FrameHeader::parse(&stream[pos..]) {
            Ok(header) => header,
            Err(_) => {
                pos += 1;
                continue;
            }
        };
        let end = pos + HEADER_LEN + header.len as usize;
        if end > stream.len() {
            break;
        }
        frames.push((header, stream[pos + HEADER_LEN..end].to_vec()));
        pos = end;
    }
    frames
}
