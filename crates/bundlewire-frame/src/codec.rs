use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Length prefix: always 4 bytes, big-endian, regardless of payload size.
pub const PREFIX_SIZE: usize = 4;

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Largest payload the prefix can describe.
pub const MAX_ENCODABLE: usize = u32::MAX as usize;

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────┐
/// │ Length (4B BE)   │ Payload          │
/// │                  │ (Length bytes)   │
/// └──────────────────┴──────────────────┘
/// ```
pub fn encode_message(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_ENCODABLE {
        return Err(FrameError::MessageTooLarge {
            size: payload.len(),
            max: MAX_ENCODABLE,
        });
    }
    dst.reserve(PREFIX_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Read a length prefix.
pub fn decode_prefix(prefix: [u8; PREFIX_SIZE]) -> u32 {
    u32::from_be_bytes(prefix)
}

/// Check a declared length against the configured limit before reading the body.
pub fn check_declared_len(declared: u32, max_message_size: usize) -> Result<usize> {
    let declared = declared as usize;
    if declared > max_message_size {
        return Err(FrameError::MessageTooLarge {
            size: declared,
            max: max_message_size,
        });
    }
    Ok(declared)
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet,
/// leaving the buffer untouched. On success, consumes exactly one message.
pub fn decode_message(src: &mut BytesMut, max_message_size: usize) -> Result<Option<Message>> {
    if src.len() < PREFIX_SIZE {
        return Ok(None);
    }

    let declared = decode_prefix([src[0], src[1], src[2], src[3]]);
    let len = check_declared_len(declared, max_message_size)?;

    if src.len() < PREFIX_SIZE + len {
        return Ok(None);
    }

    src.advance(PREFIX_SIZE);
    Ok(Some(Message::from(src.split_to(len).freeze())))
}

/// Configuration for framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum message size in bytes, both directions. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
