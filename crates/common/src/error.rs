//! Error type shared by the bridge crates.
//!
//! Faults that travel back to clients use `protocol::BridgeFault`; this type
//! covers the plumbing failures that stay inside the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A command or event channel endpoint was dropped.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Bad configuration value, caught at load or validation time.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
