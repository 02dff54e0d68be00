//! Accessory and method-call type definitions
//!
//! This module defines the types exchanged over the bridge's method channel:
//! accessory snapshot entries, the named method calls, reply values, and the
//! structured fault taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request ID for matching replies to calls
///
/// Every method call carries a unique request ID so that replies can be
/// matched to their calls. The caller is responsible for generating unique
/// IDs (typically an atomic counter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// One entry of an accessory enumeration snapshot
///
/// Indices into a snapshot are only valid against the snapshot they came
/// from; re-enumeration may reorder or shrink the list. Operations that take
/// an index therefore re-enumerate and bounds-check on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryInfo {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Manufacturer string (if available)
    pub manufacturer: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Serial number string (if available)
    pub serial_number: Option<String>,
}

/// Named method calls accepted by the accessory bridge
///
/// One variant per operation of the bridge's request surface. `index` values
/// refer to the enumeration snapshot taken while handling the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodCall {
    /// Is at least one accessory present?
    HasAccessoryConnected,

    /// Does the process already hold permission for the accessory at `index`?
    HasPermission {
        /// Index into the current enumeration snapshot
        index: u32,
    },

    /// Prompt for permission for the accessory at `index`
    ///
    /// The reply is deferred until the permission decision event fires,
    /// unless permission is already held.
    RequestPermission {
        /// Index into the current enumeration snapshot
        index: u32,
    },

    /// Open a session on the first enumerated accessory
    Connect,

    /// Read from the current session's input stream
    Read,

    /// Write `data` to the current session's output stream and flush
    Write {
        /// Payload bytes; empty payloads are a documented no-op
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl MethodCall {
    /// The method name as it appears on the channel and in logs
    pub fn name(&self) -> &'static str {
        match self {
            MethodCall::HasAccessoryConnected => "hasAccessoryConnected",
            MethodCall::HasPermission { .. } => "hasPermission",
            MethodCall::RequestPermission { .. } => "requestPermission",
            MethodCall::Connect => "connect",
            MethodCall::Read => "read",
            MethodCall::Write { .. } => "write",
        }
    }
}

/// Successful reply payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyValue {
    /// Boolean result (`hasAccessoryConnected`, `hasPermission`,
    /// `requestPermission`, `connect`, `write`)
    Flag(bool),
    /// Byte result (`read`)
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
}

/// Fault kinds surfaced by the bridge
///
/// `InvalidArgument` replaces the source's unchecked indexing; the remaining
/// kinds mirror the original error codes one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// Required OS handle missing; unrecoverable without reinitialization
    IllegalState,
    /// Malformed argument, e.g. an out-of-range accessory index
    InvalidArgument,
    /// No accessory present; caller should retry after device attach
    NoAccessory,
    /// Failure while closing the old or opening the new session
    ConnectError,
    /// I/O fault on the session's input stream
    ReadError,
    /// I/O fault on the session's output stream
    WriteError,
}

impl FaultKind {
    /// Wire code for this fault kind
    pub fn code(&self) -> &'static str {
        match self {
            FaultKind::IllegalState => "IllegalState",
            FaultKind::InvalidArgument => "InvalidArgument",
            FaultKind::NoAccessory => "NO_ACCESSORY",
            FaultKind::ConnectError => "CONNECT_ERROR",
            FaultKind::ReadError => "READ_ERROR",
            FaultKind::WriteError => "WRITE_ERROR",
        }
    }
}

/// Structured (kind, message) fault pair
///
/// Underlying OS error messages pass through verbatim; nothing is swallowed
/// except the two documented no-op policies.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}: {message}", kind.code())]
pub struct BridgeFault {
    /// Fault classification
    pub kind: FaultKind,
    /// Underlying error message, passed through verbatim
    pub message: String,
}

impl BridgeFault {
    /// Build a fault of the given kind
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Required OS handle missing
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(FaultKind::IllegalState, message)
    }

    /// Out-of-range or malformed argument
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidArgument, message)
    }

    /// Empty accessory enumeration
    pub fn no_accessory(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NoAccessory, message)
    }

    /// Session establishment failure
    pub fn connect_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ConnectError, message)
    }

    /// Input stream I/O fault
    pub fn read_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ReadError, message)
    }

    /// Output stream I/O fault
    pub fn write_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::WriteError, message)
    }
}

/// Reply to one method call: value or structured fault
pub type CallResult = Result<ReplyValue, BridgeFault>;
