//! Frame integrity
//!
//! Each frame header carries a CRC32 over the payload bytes. The socket
//! transport underneath has no integrity layer of its own, so corruption is
//! caught here before a message reaches dispatch.

use crc32fast::Hasher;

/// CRC32 of a frame payload
#[inline]
pub fn frame_checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Does `payload` hash to the checksum taken from the frame header?
#[inline]
pub fn checksum_matches(payload: &[u8], header_value: u32) -> bool {
    frame_checksum(payload) == header_value
}
