//! Protocol library for usb-accessory-bridge
//!
//! This crate defines the method-channel contract between the application
//! layer and the accessory bridge. It provides type-safe call and reply
//! definitions, serialization/deserialization using postcard, CRC32-checked
//! framing, and protocol versioning.
//!
//! # Example
//!
//! ```
//! use protocol::{CURRENT_VERSION, Message, MethodCall, RequestId};
//! use protocol::{decode_message, encode_message};
//!
//! let msg = Message::call(RequestId(1), MethodCall::HasAccessoryConnected);
//! let bytes = encode_message(&msg).unwrap();
//! let decoded = decode_message(&bytes).unwrap();
//! assert_eq!(decoded.version, CURRENT_VERSION);
//! ```
//!
//! # Framed Messages
//!
//! For socket communication, use length-prefixed CRC32-checked framing:
//!
//! ```
//! use protocol::{Message, MethodCall, RequestId};
//! use protocol::{decode_framed, encode_framed};
//!
//! let msg = Message::call(RequestId(2), MethodCall::Read);
//! let framed = encode_framed(&msg).unwrap();
//! let decoded = decode_framed(&framed).unwrap();
//! ```

pub mod codec;
pub mod error;
pub mod integrity;
pub mod messages;
pub mod types;
pub mod version;

pub use codec::{
    FRAME_HEADER_LEN, MAX_FRAME_SIZE, decode_framed, decode_message, encode_framed,
    encode_message, read_framed, validate_version, write_framed,
};

#[cfg(feature = "async")]
pub use codec::{read_framed_async, write_framed_async};
pub use error::{ProtocolError, Result};
pub use messages::{Message, MessagePayload};
pub use types::{
    AccessoryInfo, BridgeFault, CallResult, FaultKind, MethodCall, ReplyValue, RequestId,
};
pub use version::{CURRENT_VERSION, ProtocolVersion};
