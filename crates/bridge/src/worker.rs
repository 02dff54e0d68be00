//! Worker thread pumping bridge commands and permission events
//!
//! All accessory I/O is blocking, so the bridge runs on its own OS thread and
//! talks to the async side through the channel pair from
//! [`common::create_bridge`]. A command runs to completion before the next
//! one is taken, which is what keeps the single session slot race-free.

use crate::accessory::AccessoryManager;
use crate::bridge::AccessoryBridge;
use common::{AccessoryEvent, BridgeCommand, BridgeWorker};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How often the loop wakes to check permission deadlines while waits are in
/// flight
const PENDING_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Owns the bridge state and the channel endpoints for one worker thread
pub struct AccessoryWorkerThread {
    bridge: AccessoryBridge,
    worker: BridgeWorker,
}

impl AccessoryWorkerThread {
    pub fn new(
        worker: BridgeWorker,
        manager: Box<dyn AccessoryManager>,
        permission_timeout: Option<Duration>,
    ) -> Self {
        let mut bridge = AccessoryBridge::new(permission_timeout);
        bridge.initialize(manager);
        Self { bridge, worker }
    }

    /// Run until shutdown or until every command sender is gone
    pub fn run(mut self) {
        info!("Accessory worker started");

        'outer: loop {
            // Drain whatever is immediately available
            while let Some(command) = self.worker.try_recv_command() {
                if matches!(command, BridgeCommand::Shutdown) {
                    break 'outer;
                }
                self.handle_command(command);
            }

            while let Some(event) = self.worker.try_recv_event() {
                self.handle_event(event);
            }

            self.bridge.expire_permissions(Instant::now());

            if self.bridge.has_pending_permissions() {
                // A broker decision may arrive on the event channel while no
                // command is in flight, so keep polling instead of blocking
                std::thread::sleep(PENDING_POLL_INTERVAL);
            } else {
                match self.worker.recv_command() {
                    Ok(BridgeCommand::Shutdown) | Err(_) => break,
                    Ok(command) => self.handle_command(command),
                }
            }
        }

        self.bridge.teardown();
        info!("Accessory worker stopped");
    }

    fn handle_command(&mut self, command: BridgeCommand) {
        match command {
            BridgeCommand::HasAccessoryConnected { response } => {
                let _ = response.send(self.bridge.has_accessory_connected());
            }
            BridgeCommand::HasPermission { index, response } => {
                let _ = response.send(self.bridge.has_permission(index));
            }
            BridgeCommand::RequestPermission { index, response } => {
                self.bridge.request_permission(index, response);
            }
            BridgeCommand::Connect { response } => {
                let _ = response.send(self.bridge.connect());
            }
            BridgeCommand::Read { response } => {
                let _ = response.send(self.bridge.read());
            }
            BridgeCommand::Write { data, response } => {
                let _ = response.send(self.bridge.write(&data));
            }
            BridgeCommand::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: AccessoryEvent) {
        match event {
            AccessoryEvent::PermissionDecision { token, granted } => {
                debug!("Permission event for token {:?}", token);
                self.bridge.resolve_permission(token, granted);
            }
        }
    }
}

/// Spawn the worker on a dedicated thread
pub fn spawn_worker(
    worker: BridgeWorker,
    manager: Box<dyn AccessoryManager>,
    permission_timeout: Option<Duration>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("accessory-worker".to_string())
        .spawn(move || AccessoryWorkerThread::new(worker, manager, permission_timeout).run())
        .expect("Failed to spawn accessory worker thread")
}
