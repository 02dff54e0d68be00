//! Channel message shapes
//!
//! Exactly two things cross the socket: a call tagged with a request ID, and
//! the reply answering that ID with a value or a structured fault. Request
//! IDs let replies interleave, which matters because a deferred permission
//! reply can land long after later calls have already been answered.

use crate::types::{CallResult, MethodCall, RequestId};
use crate::version::{CURRENT_VERSION, ProtocolVersion};
use serde::{Deserialize, Serialize};

/// Envelope around every channel message
///
/// Carries the sender's version so the receiver can gate before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub version: ProtocolVersion,
    pub payload: MessagePayload,
}

impl Message {
    /// Envelope a call at the current version
    pub fn call(id: RequestId, call: MethodCall) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload: MessagePayload::Call { id, call },
        }
    }

    /// Envelope a reply at the current version
    pub fn reply(id: RequestId, result: CallResult) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload: MessagePayload::Reply { id, result },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    /// A named operation from the application layer
    Call { id: RequestId, call: MethodCall },

    /// Answer to a previously issued call
    Reply {
        /// ID of the call this answers
        id: RequestId,
        /// Value on success, structured fault otherwise
        result: CallResult,
    },
}
