//! Async channel bridge between the Tokio runtime and the accessory worker thread

use async_channel::{Receiver, Sender, bounded};
use protocol::{BridgeFault, CallResult, MethodCall, ReplyValue};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Capacity of the command and event channels
const CHANNEL_CAPACITY: usize = 256;

/// Correlation token for one in-flight permission request
///
/// The worker registers the deferred reply under this token; the permission
/// decision event carries it back so the continuation fires exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionToken(pub u64);

/// Commands from the Tokio runtime to the accessory worker thread
#[derive(Debug)]
pub enum BridgeCommand {
    /// Is at least one accessory present?
    HasAccessoryConnected {
        /// Channel to send the reply back
        response: tokio::sync::oneshot::Sender<Result<bool, BridgeFault>>,
    },

    /// Does the process hold permission for the accessory at `index`?
    HasPermission {
        /// Index into the current enumeration snapshot
        index: u32,
        /// Channel to send the reply back
        response: tokio::sync::oneshot::Sender<Result<bool, BridgeFault>>,
    },

    /// Prompt for permission for the accessory at `index`
    ///
    /// When the decision is deferred, the worker holds this sender until the
    /// permission decision event fires.
    RequestPermission {
        /// Index into the current enumeration snapshot
        index: u32,
        /// Channel to send the (possibly deferred) reply back
        response: tokio::sync::oneshot::Sender<Result<bool, BridgeFault>>,
    },

    /// Open a session on the first enumerated accessory
    Connect {
        /// Channel to send the reply back
        response: tokio::sync::oneshot::Sender<Result<bool, BridgeFault>>,
    },

    /// Read from the current session
    Read {
        /// Channel to send the reply back
        response: tokio::sync::oneshot::Sender<Result<Vec<u8>, BridgeFault>>,
    },

    /// Write to the current session and flush
    Write {
        /// Payload bytes
        data: Vec<u8>,
        /// Channel to send the reply back
        response: tokio::sync::oneshot::Sender<Result<bool, BridgeFault>>,
    },

    /// Shutdown the worker thread gracefully
    Shutdown,
}

/// Events from the accessory manager to the worker thread
///
/// Permission decisions arrive from whatever execution context the OS broker
/// uses; the event channel moves them onto the worker loop, which is the only
/// place pending continuations are resolved.
#[derive(Debug, Clone)]
pub enum AccessoryEvent {
    /// The permission broker decided a pending request
    PermissionDecision {
        /// Token of the pending request
        token: PermissionToken,
        /// Granted flag carried by the OS event, passed through verbatim
        granted: bool,
    },
}

/// Future resolving to the reply of one dispatched call
///
/// Channel breakage (worker gone) surfaces as [`crate::Error::Channel`],
/// never as a bridge fault.
pub type ReplyFuture = Pin<Box<dyn Future<Output = crate::Result<CallResult>> + Send>>;

/// Handle for the Tokio runtime (async)
#[derive(Clone)]
pub struct BridgeHandle {
    cmd_tx: Sender<BridgeCommand>,
}

impl BridgeHandle {
    /// Send a command to the worker thread
    pub async fn send_command(&self, cmd: BridgeCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Dispatch a method call, returning a future for its reply
    ///
    /// The command is enqueued before this returns, so calls issued in order
    /// execute in order on the worker even when their replies are awaited
    /// concurrently. A deferred permission reply therefore never blocks the
    /// dispatch of later calls.
    pub async fn begin(&self, call: MethodCall) -> crate::Result<ReplyFuture> {
        match call {
            MethodCall::HasAccessoryConnected => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                self.send_command(BridgeCommand::HasAccessoryConnected { response: tx })
                    .await?;
                Ok(flag_reply(rx))
            }
            MethodCall::HasPermission { index } => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                self.send_command(BridgeCommand::HasPermission {
                    index,
                    response: tx,
                })
                .await?;
                Ok(flag_reply(rx))
            }
            MethodCall::RequestPermission { index } => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                self.send_command(BridgeCommand::RequestPermission {
                    index,
                    response: tx,
                })
                .await?;
                Ok(flag_reply(rx))
            }
            MethodCall::Connect => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                self.send_command(BridgeCommand::Connect { response: tx })
                    .await?;
                Ok(flag_reply(rx))
            }
            MethodCall::Read => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                self.send_command(BridgeCommand::Read { response: tx })
                    .await?;
                Ok(Box::pin(async move {
                    let result = rx
                        .await
                        .map_err(|e| crate::Error::Channel(e.to_string()))?;
                    Ok(result.map(ReplyValue::Bytes))
                }))
            }
            MethodCall::Write { data } => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                self.send_command(BridgeCommand::Write { data, response: tx })
                    .await?;
                Ok(flag_reply(rx))
            }
        }
    }

    /// Issue a method call and await its reply
    pub async fn invoke(&self, call: MethodCall) -> crate::Result<CallResult> {
        self.begin(call).await?.await
    }
}

fn flag_reply(rx: tokio::sync::oneshot::Receiver<Result<bool, BridgeFault>>) -> ReplyFuture {
    Box::pin(async move {
        let result = rx
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))?;
        Ok(result.map(ReplyValue::Flag))
    })
}

/// Handle for the accessory worker thread (blocking)
pub struct BridgeWorker {
    pub(crate) cmd_rx: Receiver<BridgeCommand>,
    pub(crate) event_rx: Receiver<AccessoryEvent>,
    /// Event sender, cloned into the accessory manager so permission
    /// decisions can reach the worker loop from any context
    pub event_tx: Sender<AccessoryEvent>,
}

impl BridgeWorker {
    /// Receive a command from the Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<BridgeCommand> {
        self.cmd_rx.recv_blocking().map_err(|e| {
            debug!("Command channel closed, worker loop ending");
            crate::Error::Channel(e.to_string())
        })
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<BridgeCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Try to receive an accessory event without blocking
    pub fn try_recv_event(&self) -> Option<AccessoryEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Create the channel bridge between Tokio and the accessory worker thread
///
/// Returns (BridgeHandle for Tokio, BridgeWorker for the accessory thread)
pub fn create_bridge() -> (BridgeHandle, BridgeWorker) {
    debug!("Creating bridge channels (capacity {CHANNEL_CAPACITY})");
    let (cmd_tx, cmd_rx) = bounded(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = bounded(CHANNEL_CAPACITY);

    (
        BridgeHandle { cmd_tx },
        BridgeWorker {
            cmd_rx,
            event_rx,
            event_tx,
        },
    )
}
