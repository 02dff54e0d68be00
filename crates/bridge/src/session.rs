//! Single-slot accessory session
//!
//! A [`Session`] owns the connected accessory's input/output stream pair as
//! one value, so both handles are present or absent together and neither is
//! ever closed individually by a read or write. The bridge holds at most one
//! session; replacing it drops (and thereby closes) the previous pair first.

use crate::accessory::StreamPair;
use std::io::{self, Read, Write};

/// Fixed read chunk size, matching the channel's read contract
pub const READ_BUFFER_LEN: usize = 1024;

/// The open stream pair of the currently connected accessory
pub struct Session {
    input: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
}

impl Session {
    /// Wrap a freshly opened stream pair
    pub fn new(pair: StreamPair) -> Self {
        let (input, output) = pair;
        Self { input, output }
    }

    /// Read one chunk from the input stream
    ///
    /// Returns the exact-length slice of bytes actually read; an empty vector
    /// means the stream had nothing to yield. Never more than
    /// [`READ_BUFFER_LEN`] bytes.
    pub fn read_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = [0u8; READ_BUFFER_LEN];
        let n = self.input.read(&mut buf)?;
        Ok(buf[..n].to_vec())
    }

    /// Write all of `data` to the output stream and flush
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.output.write_all(data)?;
        self.output.flush()
    }
}
