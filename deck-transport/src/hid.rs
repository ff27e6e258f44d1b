//! HID transport for gen-2 Stream Deck hardware connected over USB

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidDevice;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::capabilities::Capabilities;
use crate::device_registry::Model;
use crate::error::TransportError;
use crate::event_parser::{InputSubsystem, ReaderConfig, ReportParser};
use crate::protocol::{self, cmd, report, FEATURE_REPORT_SIZE};
use crate::types::{Rect, TimestampedReport, TransportDeviceInfo};
use crate::{Primitive, Transport};

/// HID transport for one device
///
/// Writes go through `device`; input is read on a second handle to the same
/// path, owned by the reader thread.
pub struct HidDeckTransport {
    device: Arc<Mutex<HidDevice>>,
    info: TransportDeviceInfo,
    capabilities: Capabilities,
    input: InputSubsystem,
    connected: AtomicBool,
}

impl HidDeckTransport {
    /// Wrap opened HID handles
    ///
    /// # Arguments
    /// * `device` - Handle used for feature and output reports
    /// * `input_device` - Optional second handle for input reports
    /// * `model` - Registry entry for the product id
    /// * `info` - Device information (serial/firmware are filled in here)
    pub fn new(
        device: HidDevice,
        input_device: Option<HidDevice>,
        model: &Model,
        mut info: TransportDeviceInfo,
    ) -> Result<Self, TransportError> {
        let capabilities = model.capabilities();

        if info.serial.is_none() {
            info.serial = read_feature_string(&device, report::SERIAL, 2);
        }
        info.firmware_version = read_feature_string(&device, report::FIRMWARE_VERSION, 6);
        info.protocol_version = protocol::PROTOCOL_GEN2;

        let input = match input_device {
            Some(input) => InputSubsystem::spawn(
                input,
                ReportParser::new(
                    capabilities.key_count,
                    capabilities.encoder_count,
                    model.has_typed_input(),
                ),
                ReaderConfig::hid(info.serial.clone().unwrap_or_else(|| "deck".into())),
            )?,
            None => InputSubsystem::disabled(),
        };

        debug!(
            "Opened {} (serial {:?}, firmware {:?})",
            model.name, info.serial, info.firmware_version
        );

        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            info,
            capabilities,
            input,
            connected: AtomicBool::new(true),
        })
    }

    /// Run blocking HID I/O off the async executor
    async fn with_device<F>(&self, op: F) -> Result<(), TransportError>
    where
        F: FnOnce(&HidDevice) -> Result<(), TransportError> + Send + 'static,
    {
        if !self.link_up() {
            return Err(TransportError::Disconnected);
        }
        let device = Arc::clone(&self.device);
        let result = tokio::task::spawn_blocking(move || op(&device.lock()))
            .await
            .map_err(|e| TransportError::Internal(format!("HID worker panicked: {e}")))?;

        if let Err(e) = &result {
            if e.is_fatal() {
                self.connected.store(false, Ordering::Relaxed);
            }
        }
        result
    }

    /// False after a fatal write, `close()`, or the input reader giving up
    fn link_up(&self) -> bool {
        if self.input.link_lost() {
            self.connected.store(false, Ordering::Relaxed);
        }
        self.connected.load(Ordering::Relaxed)
    }

    fn check_key(&self, key: u8) -> Result<(), TransportError> {
        if key >= self.capabilities.key_count {
            return Err(TransportError::InvalidArgument(format!(
                "key {key} out of range (device has {})",
                self.capabilities.key_count
            )));
        }
        Ok(())
    }

    fn strip_target(&self, rect: Option<Rect>) -> Result<Rect, TransportError> {
        let strip = self
            .capabilities
            .strip_rect()
            .ok_or(TransportError::Unsupported("set-strip-image"))?;
        let local = Rect::from_size(strip.size());
        match rect {
            None => Ok(local),
            Some(r) if local.contains_rect(&r) && !r.is_empty() => Ok(r),
            Some(r) => Err(TransportError::InvalidArgument(format!(
                "strip rect {r} outside {local}"
            ))),
        }
    }
}

fn write_reports(device: &HidDevice, reports: &[Vec<u8>]) -> Result<(), TransportError> {
    for report in reports {
        device.write(report)?;
    }
    Ok(())
}

fn read_feature_string(device: &HidDevice, report_id: u8, offset: usize) -> Option<String> {
    let mut buf = [0u8; FEATURE_REPORT_SIZE];
    buf[0] = report_id;
    match device.get_feature_report(&mut buf) {
        Ok(len) => protocol::ascii_field(&buf[..len.min(buf.len())], offset),
        Err(e) => {
            debug!("Feature report 0x{:02X} unavailable: {}", report_id, e);
            None
        }
    }
}

#[async_trait]
impl Transport for HidDeckTransport {
    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn apply(&self, primitive: &Primitive) -> Result<(), TransportError> {
        match primitive {
            Primitive::SetBrightness(percent) => {
                let report = protocol::brightness_report(*percent);
                self.with_device(move |d| Ok(d.send_feature_report(&report)?))
                    .await
            }
            Primitive::ShowLogo => {
                let report = protocol::command_report(cmd::RESET, &[]);
                self.with_device(move |d| Ok(d.send_feature_report(&report)?))
                    .await
            }
            Primitive::SetKeyImage { key, data } => {
                self.check_key(*key)?;
                let reports = protocol::key_image_reports(*key, data);
                self.with_device(move |d| write_reports(d, &reports)).await
            }
            Primitive::SetStripImage { rect, data } => {
                let target = self.strip_target(*rect)?;
                let reports = protocol::strip_image_reports(target, data);
                self.with_device(move |d| write_reports(d, &reports)).await
            }
            Primitive::SetSurfaceImage(_)
            | Primitive::FillKey { .. }
            | Primitive::FillSurface(_) => Err(TransportError::Unsupported(primitive.name())),
        }
    }

    fn subscribe_input(&self) -> Option<broadcast::Receiver<TimestampedReport>> {
        self.input.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.link_up()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::Relaxed);
        self.input.shutdown();
        debug!("Closed HID transport {}", self.info.device_path);
        Ok(())
    }
}
