//! Errors produced by the wire layer

use thiserror::Error;

/// Anything that can go wrong encoding, framing, or reading channel messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// postcard failed to encode or decode a message body
    #[error("serialization failed: {0}")]
    Serialization(#[from] postcard::Error),

    /// The peer speaks a version this build cannot dispatch
    #[error(
        "incompatible peer version {major}.{minor}, this build speaks {expected_major}.{expected_minor}"
    )]
    IncompatibleVersion {
        major: u8,
        minor: u8,
        expected_major: u8,
        expected_minor: u8,
    },

    /// Length prefix above the channel's frame limit
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// Fewer bytes on hand than the frame claims
    #[error("truncated frame: wanted {expected} bytes, have {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// Payload does not hash to the checksum carried in the header
    #[error("frame checksum {actual:#010x} does not match header value {expected:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Transport failure underneath the framing
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
