//! Bridge channel versioning
//!
//! Callers and the daemon may be updated independently, so every message
//! carries the sender's version and the receiver gates on it before
//! dispatching.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic version of the method-call channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Version spoken by this build
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

impl ProtocolVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Can a peer speaking `other` talk to us?
    ///
    /// Same major, and our minor at least theirs; patch never gates.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major && self.minor >= other.minor
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
