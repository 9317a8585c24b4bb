//! Response reassembly
//!
//! Serial reads split responses at arbitrary points. The assembler keeps the
//! unconsumed tail of each read and carves complete responses off the front
//! using the two-phase `min_len` / `full_len` protocol.

use super::ring_buffer::{RingBuffer, MAX_SLICE};
use crate::protocol::{Response, ResponseCode};

/// Receive carry-over buffer plus decoder
#[derive(Default)]
pub struct ResponseAssembler {
    buffer: RingBuffer,
    skipped: u64,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn push(&mut self, bytes: &[u8]) {
        let dropped = self.buffer.extend(bytes);
        if dropped > 0 {
            log::warn!("Receive buffer full, dropped {} bytes", dropped);
        }
    }

    /// Decode the next complete response, skipping bytes that cannot start one
    ///
    /// Returns None once only an incomplete response (or nothing) is left.
    pub fn next_response(&mut self) -> Option<Response> {
        loop {
            let first = self.buffer.get(0)?;
            let code = match ResponseCode::from_header(first) {
                Ok(code) => code,
                Err(e) => {
                    self.skip(first, &e);
                    continue;
                }
            };

            let min_len = code.min_len();
            if self.buffer.len() < min_len {
                return None;
            }
            let full_len = match self
                .buffer
                .get_slice(0, min_len)
                .map(|head| code.full_len(head))
            {
                Some(Ok(len)) if len <= MAX_SLICE => len,
                Some(Ok(len)) => {
                    self.skip(
                        first,
                        &crate::Error::InvalidPacket(format!("response length {}", len)),
                    );
                    continue;
                }
                Some(Err(e)) => {
                    self.skip(first, &e);
                    continue;
                }
                None => return None,
            };
            if self.buffer.len() < full_len {
                return None;
            }

            let decoded = self.buffer.get_slice(0, full_len).map(Response::decode);
            match decoded {
                Some(Ok((response, used))) => {
                    self.buffer.advance(used);
                    return Some(response);
                }
                Some(Err(e)) => self.skip(first, &e),
                None => return None,
            }
        }
    }

    /// Bytes still waiting for the rest of their response
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded as undecodable
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn skip(&mut self, byte: u8, reason: &crate::Error) {
        log::warn!("Skipping undecodable byte {:#04x}: {}", byte, reason);
        self.buffer.advance(1);
        self.skipped += 1;
    }
}
