//! Splitting command batches into packet-sized chunks

use super::{ensure_len, CommandCode};
use crate::error::{Error, Result};

/// Group a concatenated command stream into chunks of at most `max` bytes
///
/// Chunks always end on a command boundary. A batch that already fits is
/// returned as one chunk without being parsed.
pub fn split_batch(bytes: &[u8], max: usize) -> Result<Vec<&[u8]>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() <= max {
        return Ok(vec![bytes]);
    }

    let too_large = |len| Error::PayloadTooLarge { len, max };
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        let rest = &bytes[pos..];
        let cmd_len = CommandCode::from_header(rest[0])
            .and_then(|code| code.full_len(rest))
            .map_err(|_| too_large(bytes.len()))?;
        ensure_len(rest, cmd_len).map_err(|_| too_large(bytes.len()))?;
        if cmd_len > max {
            return Err(too_large(cmd_len));
        }
        if pos + cmd_len - chunk_start > max {
            chunks.push(&bytes[chunk_start..pos]);
            chunk_start = pos;
        }
        pos += cmd_len;
    }
    chunks.push(&bytes[chunk_start..]);
    Ok(chunks)
}
