//! Accessory bridge: the method-dispatch core
//!
//! Owns the accessory manager handle, the single session slot, and the
//! pending-permission registry. Every operation runs to completion on the
//! worker thread; the only deferred reply is the permission request, whose
//! sender parks in the registry until [`AccessoryBridge::resolve_permission`]
//! fires it.

use crate::accessory::AccessoryManager;
use crate::permission::{PendingPermissions, PermissionReply};
use crate::session::Session;
use common::PermissionToken;
use protocol::{AccessoryInfo, BridgeFault};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn uninitialized() -> BridgeFault {
    BridgeFault::illegal_state("accessory manager not initialized")
}

fn accessory_at(snapshot: &[AccessoryInfo], index: u32) -> Result<&AccessoryInfo, BridgeFault> {
    snapshot.get(index as usize).ok_or_else(|| {
        BridgeFault::invalid_argument(format!(
            "index {} out of range ({} accessories)",
            index,
            snapshot.len()
        ))
    })
}

/// The bridge's mutable state and its operation surface
pub struct AccessoryBridge {
    /// OS collaborator handle; `None` until initialized and after teardown
    manager: Option<Box<dyn AccessoryManager>>,
    /// Single session slot
    session: Option<Session>,
    /// In-flight permission requests
    pending: PendingPermissions,
    /// How long a permission wait may stay pending; `None` waits forever
    permission_timeout: Option<Duration>,
}

impl AccessoryBridge {
    /// Create an uninitialized bridge
    ///
    /// Every operation fails with `IllegalState` until [`initialize`] is
    /// called.
    ///
    /// [`initialize`]: AccessoryBridge::initialize
    pub fn new(permission_timeout: Option<Duration>) -> Self {
        Self {
            manager: None,
            session: None,
            pending: PendingPermissions::default(),
            permission_timeout,
        }
    }

    /// Install the accessory manager
    pub fn initialize(&mut self, manager: Box<dyn AccessoryManager>) {
        info!("Accessory bridge initialized");
        self.manager = Some(manager);
    }

    /// Is at least one accessory present?
    pub fn has_accessory_connected(&mut self) -> Result<bool, BridgeFault> {
        let manager = self.manager.as_mut().ok_or_else(uninitialized)?;
        let snapshot = manager.accessories();
        debug!("Detected {} accessories", snapshot.len());
        Ok(!snapshot.is_empty())
    }

    /// Does the process hold permission for the accessory at `index`?
    pub fn has_permission(&mut self, index: u32) -> Result<bool, BridgeFault> {
        let manager = self.manager.as_mut().ok_or_else(uninitialized)?;
        let snapshot = manager.accessories();
        let accessory = accessory_at(&snapshot, index)?.clone();
        Ok(manager.has_permission(&accessory))
    }

    /// Prompt for permission for the accessory at `index`
    ///
    /// Replies immediately when permission is already held or the arguments
    /// fail validation; otherwise parks `reply` in the pending registry and
    /// issues exactly one OS prompt. The parked reply fires exactly once:
    /// from [`resolve_permission`], [`expire_permissions`], or [`teardown`].
    ///
    /// [`resolve_permission`]: AccessoryBridge::resolve_permission
    /// [`expire_permissions`]: AccessoryBridge::expire_permissions
    /// [`teardown`]: AccessoryBridge::teardown
    pub fn request_permission(&mut self, index: u32, reply: PermissionReply) {
        let prepared = match self.manager.as_mut() {
            None => Err(uninitialized()),
            Some(manager) => {
                let snapshot = manager.accessories();
                match accessory_at(&snapshot, index) {
                    Err(fault) => Err(fault),
                    Ok(accessory) => {
                        let accessory = accessory.clone();
                        if manager.has_permission(&accessory) {
                            Ok(None)
                        } else {
                            Ok(Some(accessory))
                        }
                    }
                }
            }
        };

        match prepared {
            Err(fault) => {
                let _ = reply.send(Err(fault));
            }
            Ok(None) => {
                // Already granted; no prompt, reply synchronously
                let _ = reply.send(Ok(true));
            }
            Ok(Some(accessory)) => {
                let deadline = self.permission_timeout.map(|t| Instant::now() + t);
                let token = self.pending.register(accessory.clone(), reply, deadline);
                debug!("Permission prompt issued, token {:?}", token);
                if let Some(manager) = self.manager.as_mut() {
                    manager.request_permission(&accessory, token);
                }
            }
        }
    }

    /// Deliver a permission decision to its parked reply
    ///
    /// Unknown tokens are ignored: the request may already have expired or
    /// been torn down, and the broker's event must not fire twice.
    pub fn resolve_permission(&mut self, token: PermissionToken, granted: bool) {
        match self.pending.resolve(token) {
            Some(entry) => {
                debug!("Permission decision for token {:?}: granted={}", token, granted);
                if entry.reply.send(Ok(granted)).is_err() {
                    warn!("Permission reply receiver dropped for token {:?}", token);
                }
            }
            None => {
                debug!("Ignoring decision for unknown token {:?}", token);
            }
        }
    }

    /// Expire pending permission waits whose deadline has passed
    ///
    /// An expired wait resolves as denied. Returns the number of waits
    /// expired.
    pub fn expire_permissions(&mut self, now: Instant) -> usize {
        let expired = self.pending.take_expired(now);
        let count = expired.len();
        for (token, entry) in expired {
            warn!(
                "Permission wait timed out for token {:?} ({:?})",
                token, entry.accessory.product
            );
            let _ = entry.reply.send(Ok(false));
        }
        count
    }

    /// Are any permission waits in flight?
    pub fn has_pending_permissions(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Open a session on the first enumerated accessory
    ///
    /// Closes any previous session first (close errors are ignored). On an
    /// open failure the old pair is already gone, so the slot stays empty.
    pub fn connect(&mut self) -> Result<bool, BridgeFault> {
        let manager = self.manager.as_mut().ok_or_else(uninitialized)?;
        let snapshot = manager.accessories();
        let Some(first) = snapshot.first() else {
            return Err(BridgeFault::no_accessory("No USB accessory found"));
        };
        let first = first.clone();

        if self.session.take().is_some() {
            debug!("Closed previous session");
        }

        let pair = manager
            .open_streams(&first)
            .map_err(|e| BridgeFault::connect_error(e.to_string()))?;
        self.session = Some(Session::new(pair));

        info!(
            "Connected to accessory {:04x}:{:04x}",
            first.vendor_id, first.product_id
        );
        Ok(true)
    }

    /// Read one chunk from the current session
    ///
    /// No open session, or a session with nothing to yield, reads as an empty
    /// byte sequence, never as a fault.
    pub fn read(&mut self) -> Result<Vec<u8>, BridgeFault> {
        if self.manager.is_none() {
            return Err(uninitialized());
        }
        match self.session.as_mut() {
            None => Ok(Vec::new()),
            Some(session) => session
                .read_chunk()
                .map_err(|e| BridgeFault::read_error(e.to_string())),
        }
    }

    /// Write `data` to the current session and flush
    ///
    /// An empty payload performs no I/O and returns `false`. With no open
    /// session the write is silently dropped; this mirrors the channel's
    /// relaxed contract rather than reporting a fault.
    pub fn write(&mut self, data: &[u8]) -> Result<bool, BridgeFault> {
        if self.manager.is_none() {
            return Err(uninitialized());
        }
        if data.is_empty() {
            return Ok(false);
        }
        match self.session.as_mut() {
            None => {
                debug!("Write of {} bytes dropped: no open session", data.len());
                Ok(true)
            }
            Some(session) => {
                session
                    .write_all(data)
                    .map_err(|e| BridgeFault::write_error(e.to_string()))?;
                Ok(true)
            }
        }
    }

    /// Detach the bridge: close the session, fail pending waits, drop the
    /// manager
    pub fn teardown(&mut self) {
        if self.session.take().is_some() {
            debug!("Closed session during teardown");
        }
        for (token, entry) in self.pending.drain() {
            debug!("Cancelling pending permission wait {:?}", token);
            let _ = entry
                .reply
                .send(Err(BridgeFault::illegal_state("bridge torn down")));
        }
        self.manager = None;
        info!("Accessory bridge torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{MockAccessoryManager, MockHandle};
    use tokio::sync::oneshot;

    fn initialized_bridge(accessories: usize) -> (AccessoryBridge, MockHandle) {
        let (tx, _rx) = async_channel::bounded(16);
        let (manager, handle) = MockAccessoryManager::new(accessories, tx);
        let mut bridge = AccessoryBridge::new(None);
        bridge.initialize(Box::new(manager));
        (bridge, handle)
    }

    #[test]
    fn test_uninitialized_bridge_faults_every_operation() {
        let mut bridge = AccessoryBridge::new(None);

        let fault = bridge.has_accessory_connected().unwrap_err();
        assert_eq!(fault.kind.code(), "IllegalState");
        assert_eq!(bridge.has_permission(0).unwrap_err().kind.code(), "IllegalState");
        assert_eq!(bridge.connect().unwrap_err().kind.code(), "IllegalState");
        assert_eq!(bridge.read().unwrap_err().kind.code(), "IllegalState");
        assert_eq!(bridge.write(&[1]).unwrap_err().kind.code(), "IllegalState");

        let (tx, mut rx) = oneshot::channel();
        bridge.request_permission(0, tx);
        let fault = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(fault.kind.code(), "IllegalState");
    }

    #[test]
    fn test_has_accessory_connected_reflects_enumeration() {
        let (mut bridge, _handle) = initialized_bridge(0);
        assert!(!bridge.has_accessory_connected().unwrap());

        let (mut bridge, _handle) = initialized_bridge(2);
        assert!(bridge.has_accessory_connected().unwrap());
    }

    #[test]
    fn test_out_of_range_index_is_invalid_argument() {
        let (mut bridge, _handle) = initialized_bridge(2);

        let fault = bridge.has_permission(2).unwrap_err();
        assert_eq!(fault.kind.code(), "InvalidArgument");
        assert!(fault.message.contains("out of range"));

        let (tx, mut rx) = oneshot::channel();
        bridge.request_permission(5, tx);
        let fault = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(fault.kind.code(), "InvalidArgument");
    }

    #[test]
    fn test_connect_with_empty_enumeration() {
        let (mut bridge, handle) = initialized_bridge(0);

        let fault = bridge.connect().unwrap_err();
        assert_eq!(fault.kind.code(), "NO_ACCESSORY");
        assert_eq!(fault.message, "No USB accessory found");
        assert!(handle.lock().opened.is_empty());
    }

    #[test]
    fn test_reconnect_closes_previous_session() {
        let (mut bridge, handle) = initialized_bridge(1);

        assert!(bridge.connect().unwrap());
        let first = handle.probe(0);
        assert!(!first.closed());

        assert!(bridge.connect().unwrap());
        assert!(first.closed());
        assert!(!handle.probe(1).closed());
    }

    #[test]
    fn test_connect_failure_carries_os_message() {
        let (mut bridge, handle) = initialized_bridge(1);
        handle.lock().fail_open = Some("device busy".to_string());

        let fault = bridge.connect().unwrap_err();
        assert_eq!(fault.kind.code(), "CONNECT_ERROR");
        assert_eq!(fault.message, "device busy");

        // The slot stays empty: a later read sees no session
        assert!(bridge.read().unwrap().is_empty());
    }

    #[test]
    fn test_write_empty_payload_is_noop_false() {
        let (mut bridge, handle) = initialized_bridge(1);
        bridge.connect().unwrap();

        assert!(!bridge.write(&[]).unwrap());
        assert_eq!(handle.probe(0).written_len(), 0);
        assert_eq!(
            handle
                .probe(0)
                .flushes
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[test]
    fn test_write_transfers_exact_bytes_and_flushes() {
        let (mut bridge, handle) = initialized_bridge(1);
        bridge.connect().unwrap();

        assert!(bridge.write(&[0x01, 0x02]).unwrap());

        let probe = handle.probe(0);
        assert_eq!(*probe.written.lock().unwrap(), vec![0x01, 0x02]);
        assert_eq!(probe.flushes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_without_session_is_silently_dropped() {
        let (mut bridge, handle) = initialized_bridge(1);

        assert!(bridge.write(&[1, 2, 3]).unwrap());
        assert!(handle.lock().opened.is_empty());
    }

    #[test]
    fn test_read_without_session_is_empty() {
        let (mut bridge, _handle) = initialized_bridge(1);
        assert!(bridge.read().unwrap().is_empty());
    }

    #[test]
    fn test_read_zero_bytes_is_empty_not_fault() {
        let (mut bridge, _handle) = initialized_bridge(1);
        bridge.connect().unwrap();
        assert!(bridge.read().unwrap().is_empty());
    }

    #[test]
    fn test_read_write_faults_carry_kind() {
        let (mut bridge, handle) = initialized_bridge(1);
        handle.lock().fail_read = true;
        handle.lock().fail_write = true;
        bridge.connect().unwrap();

        assert_eq!(bridge.read().unwrap_err().kind.code(), "READ_ERROR");
        assert_eq!(bridge.write(&[1]).unwrap_err().kind.code(), "WRITE_ERROR");
    }

    #[test]
    fn test_loopback_scenario() {
        let (mut bridge, _handle) = initialized_bridge(1);

        assert!(bridge.has_accessory_connected().unwrap());
        assert!(bridge.connect().unwrap());
        assert!(bridge.write(&[0x01, 0x02]).unwrap());
        assert_eq!(bridge.read().unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn test_request_permission_granted_replies_without_prompt() {
        let (mut bridge, handle) = initialized_bridge(1);
        handle.lock().granted[0] = true;

        let (tx, mut rx) = oneshot::channel();
        bridge.request_permission(0, tx);

        assert_eq!(rx.try_recv().unwrap(), Ok(true));
        assert_eq!(handle.prompt_count(), 0);
        assert!(!bridge.has_pending_permissions());
    }

    #[test]
    fn test_request_permission_defers_until_decision() {
        let (mut bridge, handle) = initialized_bridge(1);

        let (tx, mut rx) = oneshot::channel();
        bridge.request_permission(0, tx);

        // Exactly one prompt, reply still pending
        assert_eq!(handle.prompt_count(), 1);
        assert!(rx.try_recv().is_err());
        assert!(bridge.has_pending_permissions());

        let token = handle.last_token().unwrap();
        bridge.resolve_permission(token, true);
        assert_eq!(rx.try_recv().unwrap(), Ok(true));
        assert!(!bridge.has_pending_permissions());

        // A duplicate decision is ignored
        bridge.resolve_permission(token, false);
    }

    #[test]
    fn test_request_permission_denied_decision_passes_through() {
        let (mut bridge, handle) = initialized_bridge(1);

        let (tx, mut rx) = oneshot::channel();
        bridge.request_permission(0, tx);
        let token = handle.last_token().unwrap();

        bridge.resolve_permission(token, false);
        assert_eq!(rx.try_recv().unwrap(), Ok(false));
    }

    #[test]
    fn test_permission_timeout_resolves_as_denied() {
        let (tx_ev, _rx_ev) = async_channel::bounded(16);
        let (manager, _handle) = MockAccessoryManager::new(1, tx_ev);
        let mut bridge = AccessoryBridge::new(Some(Duration::from_millis(1)));
        bridge.initialize(Box::new(manager));

        let (tx, mut rx) = oneshot::channel();
        bridge.request_permission(0, tx);
        assert!(bridge.has_pending_permissions());

        let expired = bridge.expire_permissions(Instant::now() + Duration::from_secs(1));
        assert_eq!(expired, 1);
        assert_eq!(rx.try_recv().unwrap(), Ok(false));
    }

    #[test]
    fn test_teardown_closes_session_and_fails_pending() {
        let (mut bridge, handle) = initialized_bridge(1);
        bridge.connect().unwrap();

        let (tx, mut rx) = oneshot::channel();
        bridge.request_permission(0, tx);

        bridge.teardown();

        assert!(handle.probe(0).closed());
        let fault = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(fault.kind.code(), "IllegalState");

        // Everything faults IllegalState after teardown
        assert_eq!(
            bridge.has_accessory_connected().unwrap_err().kind.code(),
            "IllegalState"
        );
    }
}
