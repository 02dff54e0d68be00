//! Message framing over the host socket
//!
//! Messages serialize with postcard (compact binary) and travel framed: a
//! length prefix so the reader knows how much to pull, and a CRC32 so a
//! corrupted payload never reaches dispatch.
//!
//! # Frame Format
//!
//! ```text
//! [Length: u32 (big-endian)][CRC32: u32 (big-endian)][Message bytes (postcard)]
//! ```
//!
//! Maximum frame size is 64 KiB; the largest legitimate payload is a read
//! reply of at most 1024 bytes, so anything larger is rejected outright.

use crate::{
    CURRENT_VERSION, Message, ProtocolVersion,
    error::{ProtocolError, Result},
    integrity::{checksum_matches, frame_checksum},
};
use std::io::{Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum allowed frame payload size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Frame header length: 4-byte length prefix + 4-byte checksum
pub const FRAME_HEADER_LEN: usize = 8;

/// Serialize a message body with postcard
///
/// # Example
/// ```
/// use protocol::{Message, MethodCall, RequestId, encode_message};
///
/// let msg = Message::call(RequestId(1), MethodCall::Connect);
/// let bytes = encode_message(&msg).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    postcard::to_allocvec(message).map_err(ProtocolError::from)
}

/// Deserialize a message body with postcard
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    postcard::from_bytes(bytes).map_err(ProtocolError::from)
}

/// Gate an incoming message on its version
///
/// A major mismatch is rejected before dispatch; minor differences pass in
/// both directions, since no minor revision has changed the call surface yet.
pub fn validate_version(message_version: &ProtocolVersion) -> Result<()> {
    if message_version.major != CURRENT_VERSION.major {
        return Err(ProtocolError::IncompatibleVersion {
            major: message_version.major,
            minor: message_version.minor,
            expected_major: CURRENT_VERSION.major,
            expected_minor: CURRENT_VERSION.minor,
        });
    }
    Ok(())
}

/// Serialize a message and wrap it in a frame
///
/// The frame is `[length: u32 BE][crc32: u32 BE][postcard bytes]`, with the
/// checksum taken over the postcard bytes only.
pub fn encode_framed(message: &Message) -> Result<Vec<u8>> {
    let message_bytes = encode_message(message)?;
    let message_len = message_bytes.len();

    if message_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: message_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let checksum = frame_checksum(&message_bytes);

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + message_len);
    frame.extend_from_slice(&(message_len as u32).to_be_bytes());
    frame.extend_from_slice(&checksum.to_be_bytes());
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}

/// Unwrap and deserialize one complete frame
///
/// Checks the length against the buffer and the limit, then the checksum,
/// before touching postcard.
pub fn decode_framed(frame: &[u8]) -> Result<Message> {
    if frame.len() < FRAME_HEADER_LEN {
        return Err(ProtocolError::IncompleteFrame {
            expected: FRAME_HEADER_LEN,
            actual: frame.len(),
        });
    }

    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let expected_checksum = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    if frame.len() < FRAME_HEADER_LEN + length {
        return Err(ProtocolError::IncompleteFrame {
            expected: FRAME_HEADER_LEN + length,
            actual: frame.len(),
        });
    }

    let message_bytes = &frame[FRAME_HEADER_LEN..FRAME_HEADER_LEN + length];
    if !checksum_matches(message_bytes, expected_checksum) {
        return Err(ProtocolError::ChecksumMismatch {
            expected: expected_checksum,
            actual: frame_checksum(message_bytes),
        });
    }

    decode_message(message_bytes)
}

/// Frame and write one message to a blocking writer
pub fn write_framed<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let framed = encode_framed(message)?;
    writer.write_all(&framed)?;
    Ok(())
}

/// Read and unwrap one message from a blocking reader
pub fn read_framed<R: Read>(reader: &mut R) -> Result<Message> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header)?;
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let expected_checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes)?;

    if !checksum_matches(&message_bytes, expected_checksum) {
        return Err(ProtocolError::ChecksumMismatch {
            expected: expected_checksum,
            actual: frame_checksum(&message_bytes),
        });
    }

    decode_message(&message_bytes)
}

/// Write already-framed bytes to an async writer
#[cfg(feature = "async")]
pub async fn write_framed_async<W>(writer: &mut W, framed_bytes: &[u8]) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    writer.write_all(framed_bytes).await?;
    Ok(())
}

/// Pull one complete frame off an async reader
///
/// Returns the raw frame bytes, header included, ready for
/// [`decode_framed`]; checksum verification happens there.
#[cfg(feature = "async")]
pub async fn read_framed_async<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes).await?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + length);
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}
