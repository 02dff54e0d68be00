//! Accessory manager abstraction
//!
//! The OS-level collaborators (enumeration, the permission broker, the raw
//! stream pair) sit behind the [`AccessoryManager`] trait. The bridge only
//! ever talks to this trait, so the host implementation (libusb) and the
//! in-memory mock are interchangeable.

pub mod host;
#[cfg(test)]
pub mod mock;

use common::PermissionToken;
use protocol::AccessoryInfo;
use std::io::{Read, Write};

pub use host::HostAccessoryManager;
#[cfg(test)]
pub use mock::{MockAccessoryManager, MockHandle};

/// A session's raw stream pair, input then output
pub type StreamPair = (Box<dyn Read + Send>, Box<dyn Write + Send>);

/// OS accessory broker: enumeration, permission, stream establishment
///
/// Implementations run on the accessory worker thread; the one exception is
/// permission decisions, which may be produced from any context and must be
/// delivered through the event channel handed to the implementation at
/// construction time.
pub trait AccessoryManager: Send {
    /// Take a fresh enumeration snapshot
    ///
    /// Indices handed out to callers are only meaningful against the snapshot
    /// returned here; every operation re-enumerates.
    fn accessories(&mut self) -> Vec<AccessoryInfo>;

    /// Does the process currently hold permission for this accessory?
    fn has_permission(&mut self, accessory: &AccessoryInfo) -> bool;

    /// Issue the OS permission prompt for this accessory
    ///
    /// The decision arrives later as an
    /// [`AccessoryEvent::PermissionDecision`](common::AccessoryEvent) carrying
    /// `token`; it must be delivered exactly once.
    fn request_permission(&mut self, accessory: &AccessoryInfo, token: PermissionToken);

    /// Open the accessory and establish its input/output stream pair
    ///
    /// The returned error message passes verbatim into a `CONNECT_ERROR`
    /// fault.
    fn open_streams(&mut self, accessory: &AccessoryInfo) -> std::io::Result<StreamPair>;
}
