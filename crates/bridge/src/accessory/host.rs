//! Host-side accessory manager backed by libusb
//!
//! Enumerates devices in Android Open Accessory mode (Google's vendor ID with
//! the AOA product ID range) and exposes their bulk endpoint pair as the
//! session's byte streams.
//!
//! The host platform has no interactive permission broker: permission is
//! whatever device-node access the process already has. `request_permission`
//! therefore probes access and delivers the decision event immediately, which
//! keeps the one-shot decision contract intact.

use super::{AccessoryManager, StreamPair};
use common::{AccessoryEvent, PermissionToken};
use protocol::AccessoryInfo;
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Google's vendor ID, used by all accessory-mode devices
const AOA_VENDOR_ID: u16 = 0x18d1;

/// AOA product ID range: accessory, adb, audio and their combinations
const AOA_PRODUCT_ID_MIN: u16 = 0x2d00;
const AOA_PRODUCT_ID_MAX: u16 = 0x2d05;

/// Bulk read timeout; expiry is reported as "no data", not an error
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Bulk write timeout
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Is this VID/PID pair an accessory-mode device?
fn is_accessory_id(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == AOA_VENDOR_ID
        && (AOA_PRODUCT_ID_MIN..=AOA_PRODUCT_ID_MAX).contains(&product_id)
}

fn io_err(e: rusb::Error) -> io::Error {
    io::Error::other(e.to_string())
}

/// Accessory manager backed by a libusb context
pub struct HostAccessoryManager {
    context: Context,
    event_tx: async_channel::Sender<AccessoryEvent>,
}

impl HostAccessoryManager {
    /// Create a new host accessory manager
    pub fn new(event_tx: async_channel::Sender<AccessoryEvent>) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        Ok(Self { context, event_tx })
    }

    /// Devices currently in accessory mode, in bus order
    fn accessory_devices(&self) -> Vec<Device<Context>> {
        let devices = match self.context.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate USB devices: {}", e);
                return Vec::new();
            }
        };

        devices
            .iter()
            .filter(|device| {
                device
                    .device_descriptor()
                    .map(|desc| is_accessory_id(desc.vendor_id(), desc.product_id()))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Build an [`AccessoryInfo`] snapshot entry for a device
    ///
    /// Reads string descriptors (manufacturer, product, serial) if the device
    /// can be opened; otherwise the strings stay absent.
    fn info_for(&self, device: &Device<Context>) -> Option<AccessoryInfo> {
        let descriptor = device.device_descriptor().ok()?;

        let strings = device.open().ok().map(|handle| {
            (
                handle.read_manufacturer_string_ascii(&descriptor).ok(),
                handle.read_product_string_ascii(&descriptor).ok(),
                handle.read_serial_number_string_ascii(&descriptor).ok(),
            )
        });
        let (manufacturer, product, serial_number) = strings.unwrap_or((None, None, None));

        Some(AccessoryInfo {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            manufacturer,
            product,
            serial_number,
        })
    }

    /// Find the device matching a snapshot entry
    ///
    /// Matches on VID/PID, and on the serial number when the snapshot carries
    /// one. Returns None when the accessory has detached since enumeration.
    fn find_device(&self, accessory: &AccessoryInfo) -> Option<Device<Context>> {
        self.accessory_devices().into_iter().find(|device| {
            let Ok(descriptor) = device.device_descriptor() else {
                return false;
            };
            if descriptor.vendor_id() != accessory.vendor_id
                || descriptor.product_id() != accessory.product_id
            {
                return false;
            }
            match &accessory.serial_number {
                None => true,
                Some(serial) => device
                    .open()
                    .ok()
                    .and_then(|handle| handle.read_serial_number_string_ascii(&descriptor).ok())
                    .is_some_and(|s| s == *serial),
            }
        })
    }

    fn probe_access(&self, accessory: &AccessoryInfo) -> bool {
        match self.find_device(accessory) {
            None => false,
            Some(device) => match device.open() {
                Ok(_) => true,
                Err(rusb::Error::Access) => false,
                Err(e) => {
                    debug!("Access probe failed: {}", e);
                    false
                }
            },
        }
    }
}

impl AccessoryManager for HostAccessoryManager {
    fn accessories(&mut self) -> Vec<AccessoryInfo> {
        let infos: Vec<AccessoryInfo> = self
            .accessory_devices()
            .iter()
            .filter_map(|device| self.info_for(device))
            .collect();
        debug!("Enumerated {} accessories", infos.len());
        infos
    }

    fn has_permission(&mut self, accessory: &AccessoryInfo) -> bool {
        self.probe_access(accessory)
    }

    fn request_permission(&mut self, accessory: &AccessoryInfo, token: PermissionToken) {
        // No interactive broker on the host: the decision is the current
        // device-node access, delivered through the regular event path.
        let granted = self.probe_access(accessory);
        if let Err(e) = self
            .event_tx
            .send_blocking(AccessoryEvent::PermissionDecision { token, granted })
        {
            warn!("Failed to deliver permission decision: {}", e);
        }
    }

    fn open_streams(&mut self, accessory: &AccessoryInfo) -> io::Result<StreamPair> {
        let device = self.find_device(accessory).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "accessory no longer attached")
        })?;

        let mut handle = device.open().map_err(io_err)?;

        if handle.kernel_driver_active(0).unwrap_or(false) {
            if let Err(e) = handle.detach_kernel_driver(0) {
                debug!("Failed to detach kernel driver: {}", e);
            }
        }
        handle.claim_interface(0).map_err(io_err)?;

        let config = device.active_config_descriptor().map_err(io_err)?;
        let mut in_endpoint = None;
        let mut out_endpoint = None;
        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                for endpoint in descriptor.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In if in_endpoint.is_none() => {
                            in_endpoint = Some(endpoint.address());
                        }
                        Direction::Out if out_endpoint.is_none() => {
                            out_endpoint = Some(endpoint.address());
                        }
                        _ => {}
                    }
                }
            }
        }

        let (in_endpoint, out_endpoint) = match (in_endpoint, out_endpoint) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                return Err(io::Error::other("accessory exposes no bulk endpoint pair"));
            }
        };
        debug!(
            "Opened accessory streams: in={:#04x}, out={:#04x}",
            in_endpoint, out_endpoint
        );

        let handle = Arc::new(handle);
        let input = BulkReader {
            handle: Arc::clone(&handle),
            endpoint: in_endpoint,
        };
        let output = BulkWriter {
            handle,
            endpoint: out_endpoint,
        };
        Ok((Box::new(input), Box::new(output)))
    }
}

/// Session input stream over the accessory's bulk IN endpoint
struct BulkReader {
    handle: Arc<DeviceHandle<Context>>,
    endpoint: u8,
}

impl Read for BulkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.handle.read_bulk(self.endpoint, buf, READ_TIMEOUT) {
            Ok(n) => Ok(n),
            // Timeout is the accessory having nothing to say
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => Err(io_err(e)),
        }
    }
}

/// Session output stream over the accessory's bulk OUT endpoint
struct BulkWriter {
    handle: Arc<DeviceHandle<Context>>,
    endpoint: u8,
}

impl Write for BulkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle
            .write_bulk(self.endpoint, buf, WRITE_TIMEOUT)
            .map_err(io_err)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Bulk writes hit the wire on submission; nothing is buffered here
        Ok(())
    }
}
