//! Device enumeration and opening for HID-attached decks

use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidApi;
use tracing::{debug, info};

use crate::device_registry;
use crate::error::TransportError;
use crate::hid::HidDeckTransport;
use crate::types::{DiscoveredDevice, TransportDeviceInfo};
use crate::{BoxedTransport, Connector};

/// Enumerates supported devices on the HID bus
#[derive(Debug, Default, Clone)]
pub struct HidDiscovery;

impl HidDiscovery {
    pub fn new() -> Self {
        Self
    }

    fn api() -> Result<HidApi, TransportError> {
        HidApi::new().map_err(|e| TransportError::DriverUnavailable(e.to_string()))
    }

    /// List currently attached supported devices
    pub fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let api = Self::api()?;
        let mut devices: Vec<DiscoveredDevice> = Vec::new();

        for dev in api.device_list() {
            let Some(model) = device_registry::lookup(dev.vendor_id(), dev.product_id()) else {
                continue;
            };
            let path = dev.path().to_string_lossy().into_owned();
            if devices.iter().any(|d| d.info.device_path == path) {
                continue;
            }
            debug!(
                "Found {} at {} ({:04X}:{:04X})",
                model.name,
                path,
                dev.vendor_id(),
                dev.product_id()
            );
            devices.push(DiscoveredDevice {
                info: TransportDeviceInfo {
                    vid: dev.vendor_id(),
                    pid: dev.product_id(),
                    device_path: path,
                    serial: dev.serial_number().filter(|s| !s.is_empty()).map(String::from),
                    product_name: dev.product_string().map(String::from),
                    firmware_version: None,
                    protocol_version: 0,
                },
                model: model.name,
            });
        }

        Ok(devices)
    }

    /// Open a specific device
    pub fn open_device(&self, device: &DiscoveredDevice) -> Result<BoxedTransport, TransportError> {
        let model = device_registry::lookup(device.info.vid, device.info.pid).ok_or_else(|| {
            TransportError::DeviceNotFound(format!(
                "{:04X}:{:04X} is not a supported model",
                device.info.vid, device.info.pid
            ))
        })?;

        let api = Self::api()?;
        let path = std::ffi::CString::new(device.info.device_path.clone())
            .map_err(|e| TransportError::InvalidArgument(e.to_string()))?;

        let handle = api.open_path(&path)?;
        let input = match api.open_path(&path) {
            Ok(input) => Some(input),
            Err(e) => {
                debug!("No separate input handle for {}: {}", device.info.device_path, e);
                None
            }
        };

        let transport = HidDeckTransport::new(handle, input, model, device.info.clone())?;
        info!(
            "Connected to {} ({})",
            model.name,
            device.info.serial.as_deref().unwrap_or("no serial")
        );
        Ok(Arc::new(transport))
    }
}

/// Opens the first supported device, optionally matching a serial number
#[derive(Debug, Clone, Default)]
pub struct HidConnector {
    serial: Option<String>,
}

impl HidConnector {
    pub fn new(serial: Option<String>) -> Self {
        Self { serial }
    }
}

#[async_trait]
impl Connector for HidConnector {
    async fn open(&self) -> Result<BoxedTransport, TransportError> {
        let discovery = HidDiscovery::new();
        let devices = discovery.list_devices()?;
        let device = devices
            .iter()
            .find(|d| match &self.serial {
                Some(serial) => d.info.serial.as_deref() == Some(serial.as_str()),
                None => true,
            })
            .ok_or_else(|| {
                TransportError::DeviceNotFound(match &self.serial {
                    Some(serial) => format!("no device with serial {serial}"),
                    None => "no supported device found".into(),
                })
            })?;
        discovery.open_device(device)
    }
}
