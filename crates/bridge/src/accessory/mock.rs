//! In-memory accessory manager for tests
//!
//! Simulates the OS collaborators with instrumented state: a configurable
//! enumeration, per-accessory permission flags, a prompt log with the tokens
//! handed out, and loopback stream pairs that count bytes, flushes, and
//! closes. Tests hold a [`MockHandle`] to inspect and mutate the shared state
//! after the manager has moved into the bridge.

use super::{AccessoryManager, StreamPair};
use common::{AccessoryEvent, PermissionToken};
use protocol::AccessoryInfo;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Create a mock accessory snapshot entry
pub fn create_mock_accessory(id: u32) -> AccessoryInfo {
    AccessoryInfo {
        vendor_id: 0x18d1,
        product_id: 0x2d00,
        manufacturer: Some(format!("Test Manufacturer {}", id)),
        product: Some(format!("Test Accessory {}", id)),
        serial_number: Some(format!("SN{:06}", id)),
    }
}

/// Instrumentation for one opened stream pair
#[derive(Default)]
pub struct StreamProbe {
    /// Loopback buffer: writes land here, reads drain it
    buffer: Mutex<VecDeque<u8>>,
    /// Every byte ever written through the output stream
    pub written: Mutex<Vec<u8>>,
    /// Number of flushes on the output stream
    pub flushes: AtomicUsize,
    /// Input stream has been dropped
    pub input_closed: AtomicBool,
    /// Output stream has been dropped
    pub output_closed: AtomicBool,
}

impl StreamProbe {
    /// Both halves of the pair have been dropped
    pub fn closed(&self) -> bool {
        self.input_closed.load(Ordering::SeqCst) && self.output_closed.load(Ordering::SeqCst)
    }

    /// Total bytes written through the output stream
    pub fn written_len(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    /// Preload bytes for the input stream to yield
    pub fn push_readable(&self, bytes: &[u8]) {
        self.buffer.lock().unwrap().extend(bytes.iter().copied());
    }
}

/// Shared mutable state behind a [`MockAccessoryManager`]
#[derive(Default)]
pub struct MockState {
    /// Enumeration snapshot returned by `accessories()`
    pub accessories: Vec<AccessoryInfo>,
    /// Permission flag per accessory, parallel to `accessories`
    pub granted: Vec<bool>,
    /// Every prompt issued, with the token it was issued under
    pub prompts: Vec<(AccessoryInfo, PermissionToken)>,
    /// When set, prompts auto-resolve with this decision via the event channel
    pub auto_decision: Option<bool>,
    /// When set, `open_streams` fails with this message
    pub fail_open: Option<String>,
    /// Opened streams fail reads with an injected fault
    pub fail_read: bool,
    /// Opened streams fail writes with an injected fault
    pub fail_write: bool,
    /// Probe for every stream pair ever opened, in open order
    pub opened: Vec<Arc<StreamProbe>>,
}

/// Test-side view of a mock manager's shared state
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Lock the shared state for inspection or mutation
    pub fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Number of permission prompts issued so far
    pub fn prompt_count(&self) -> usize {
        self.lock().prompts.len()
    }

    /// Token of the most recent prompt
    pub fn last_token(&self) -> Option<PermissionToken> {
        self.lock().prompts.last().map(|(_, token)| *token)
    }

    /// Probe of the `n`-th opened stream pair
    pub fn probe(&self, n: usize) -> Arc<StreamProbe> {
        Arc::clone(&self.lock().opened[n])
    }
}

/// Accessory manager over in-memory state
pub struct MockAccessoryManager {
    state: Arc<Mutex<MockState>>,
    event_tx: async_channel::Sender<AccessoryEvent>,
}

impl MockAccessoryManager {
    /// Create a manager with `count` accessories, none granted
    ///
    /// Returns the manager and a handle to its shared state.
    pub fn new(
        count: usize,
        event_tx: async_channel::Sender<AccessoryEvent>,
    ) -> (Self, MockHandle) {
        let state = MockState {
            accessories: (0..count as u32).map(create_mock_accessory).collect(),
            granted: vec![false; count],
            ..MockState::default()
        };
        let state = Arc::new(Mutex::new(state));
        let handle = MockHandle {
            state: Arc::clone(&state),
        };
        (Self { state, event_tx }, handle)
    }

    fn index_of(state: &MockState, accessory: &AccessoryInfo) -> Option<usize> {
        state.accessories.iter().position(|a| a == accessory)
    }
}

impl AccessoryManager for MockAccessoryManager {
    fn accessories(&mut self) -> Vec<AccessoryInfo> {
        self.state.lock().unwrap().accessories.clone()
    }

    fn has_permission(&mut self, accessory: &AccessoryInfo) -> bool {
        let state = self.state.lock().unwrap();
        Self::index_of(&state, accessory)
            .map(|i| state.granted[i])
            .unwrap_or(false)
    }

    fn request_permission(&mut self, accessory: &AccessoryInfo, token: PermissionToken) {
        let auto_decision = {
            let mut state = self.state.lock().unwrap();
            state.prompts.push((accessory.clone(), token));
            state.auto_decision
        };
        debug!("Mock prompt issued for token {:?}", token);

        if let Some(granted) = auto_decision {
            self.event_tx
                .send_blocking(AccessoryEvent::PermissionDecision { token, granted })
                .ok();
        }
    }

    fn open_streams(&mut self, _accessory: &AccessoryInfo) -> io::Result<StreamPair> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_open {
            return Err(io::Error::other(message.clone()));
        }

        let probe = Arc::new(StreamProbe::default());
        state.opened.push(Arc::clone(&probe));

        let input = LoopbackReader {
            probe: Arc::clone(&probe),
            fail: state.fail_read,
        };
        let output = LoopbackWriter {
            probe,
            fail: state.fail_write,
        };
        Ok((Box::new(input), Box::new(output)))
    }
}

/// Input half of a loopback pair
struct LoopbackReader {
    probe: Arc<StreamProbe>,
    fail: bool,
}

impl Read for LoopbackReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail {
            return Err(io::Error::other("injected read fault"));
        }
        let mut buffer = self.probe.buffer.lock().unwrap();
        let n = buf.len().min(buffer.len());
        for slot in buf.iter_mut().take(n) {
            *slot = buffer.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

impl Drop for LoopbackReader {
    fn drop(&mut self) {
        self.probe.input_closed.store(true, Ordering::SeqCst);
    }
}

/// Output half of a loopback pair; writes become readable on the input half
struct LoopbackWriter {
    probe: Arc<StreamProbe>,
    fail: bool,
}

impl Write for LoopbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail {
            return Err(io::Error::other("injected write fault"));
        }
        self.probe.written.lock().unwrap().extend_from_slice(buf);
        self.probe
            .buffer
            .lock()
            .unwrap()
            .extend(buf.iter().copied());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.probe.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for LoopbackWriter {
    fn drop(&mut self) {
        self.probe.output_closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_echo() {
        let (tx, _rx) = async_channel::bounded(16);
        let (mut manager, handle) = MockAccessoryManager::new(1, tx);

        let accessory = manager.accessories()[0].clone();
        let (mut input, mut output) = manager.open_streams(&accessory).unwrap();

        output.write_all(&[1, 2, 3]).unwrap();
        output.flush().unwrap();

        let mut buf = [0u8; 8];
        let n = input.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        let probe = handle.probe(0);
        assert_eq!(probe.written_len(), 3);
        assert_eq!(probe.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_tracking() {
        let (tx, _rx) = async_channel::bounded(16);
        let (mut manager, handle) = MockAccessoryManager::new(1, tx);

        let accessory = manager.accessories()[0].clone();
        let pair = manager.open_streams(&accessory).unwrap();
        let probe = handle.probe(0);
        assert!(!probe.closed());

        drop(pair);
        assert!(probe.closed());
    }

    #[test]
    fn test_auto_decision_sends_event() {
        let (tx, rx) = async_channel::bounded(16);
        let (mut manager, handle) = MockAccessoryManager::new(1, tx);
        handle.lock().auto_decision = Some(true);

        let accessory = manager.accessories()[0].clone();
        let token = PermissionToken(99);
        manager.request_permission(&accessory, token);

        let Ok(AccessoryEvent::PermissionDecision {
            token: event_token,
            granted,
        }) = rx.try_recv()
        else {
            panic!("Expected a permission decision event");
        };
        assert_eq!(event_token, token);
        assert!(granted);
        assert_eq!(handle.prompt_count(), 1);
    }
}
