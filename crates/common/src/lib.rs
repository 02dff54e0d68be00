//! Common utilities for usb-accessory-bridge
//!
//! This crate provides shared functionality between the bridge worker and the
//! host loop: error handling, logging setup, and the async channel bridge for
//! accessory worker thread communication.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{
    AccessoryEvent, BridgeCommand, BridgeHandle, BridgeWorker, PermissionToken, ReplyFuture,
    create_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
