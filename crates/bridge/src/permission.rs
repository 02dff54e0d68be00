//! Pending permission request registry
//!
//! One entry per in-flight permission prompt: the deferred reply sender, the
//! target accessory, and an optional deadline. Entries leave the registry
//! exactly once, on resolution, expiry, or teardown drain, so every prompt
//! gets exactly one reply and no listener outlives its request.

use common::PermissionToken;
use protocol::{AccessoryInfo, BridgeFault};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::oneshot;

/// Deferred reply sender for one permission request
pub type PermissionReply = oneshot::Sender<Result<bool, BridgeFault>>;

/// One in-flight permission request
pub struct PendingPermission {
    /// Reply sender, consumed on resolution
    pub reply: PermissionReply,
    /// Accessory the prompt targets
    pub accessory: AccessoryInfo,
    /// When the wait gives up, if a timeout is configured
    pub deadline: Option<Instant>,
}

/// Registry of in-flight permission requests keyed by correlation token
#[derive(Default)]
pub struct PendingPermissions {
    entries: HashMap<PermissionToken, PendingPermission>,
}

impl PendingPermissions {
    /// Register a deferred reply, returning its fresh correlation token
    pub fn register(
        &mut self,
        accessory: AccessoryInfo,
        reply: PermissionReply,
        deadline: Option<Instant>,
    ) -> PermissionToken {
        let mut token = PermissionToken(rand::random());
        while self.entries.contains_key(&token) {
            token = PermissionToken(rand::random());
        }
        self.entries.insert(token, PendingPermission {
            reply,
            accessory,
            deadline,
        });
        token
    }

    /// Remove and return the entry for `token`, if still pending
    pub fn resolve(&mut self, token: PermissionToken) -> Option<PendingPermission> {
        self.entries.remove(&token)
    }

    /// Remove and return every entry whose deadline has passed
    pub fn take_expired(&mut self, now: Instant) -> Vec<(PermissionToken, PendingPermission)> {
        let expired: Vec<PermissionToken> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline.is_some_and(|d| d <= now))
            .map(|(token, _)| *token)
            .collect();

        expired
            .into_iter()
            .filter_map(|token| self.entries.remove(&token).map(|entry| (token, entry)))
            .collect()
    }

    /// Remove and return every entry (teardown path)
    pub fn drain(&mut self) -> Vec<(PermissionToken, PendingPermission)> {
        self.entries.drain().collect()
    }

    /// Number of in-flight requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No requests in flight
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
