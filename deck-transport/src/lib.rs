//! Transport abstraction layer for Stream Deck class devices
//!
//! This crate defines the boundary between the device pipeline and the
//! physical link:
//!
//! - [`Capabilities`]: immutable description of the attached model
//! - [`Primitive`]: the coarse commands the hardware executes natively
//! - [`InputReport`]: raw input snapshots and one-shot events
//! - [`Transport`] / [`Connector`]: the traits every backend implements
//!
//! A `hidapi` backend for gen-2 hardware is included.

pub mod capabilities;
pub mod device_registry;
pub mod error;
pub mod event_parser;
pub mod protocol;
pub mod types;

mod discovery;
mod hid;

pub use capabilities::{
    Capabilities, CapabilitiesBuilder, CapabilityError, Features, Grid, ImageFormat,
    ImageTransform, StripGeometry,
};
pub use device_registry::{Model, MODELS, VENDOR_ID};
pub use discovery::{HidConnector, HidDiscovery};
pub use error::TransportError;
pub use event_parser::{InputSource, InputSubsystem, ReaderConfig, ReportParser};
pub use hid::HidDeckTransport;
pub use types::{
    Color, DiscoveredDevice, InputReport, Point, Rect, Size, TimestampedReport,
    TransportDeviceInfo,
};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A command the hardware can execute in one transport round-trip.
///
/// Image payloads are already encoded in the format named by
/// [`Capabilities::image_format`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    /// Backlight brightness in percent (0-100)
    SetBrightness(u8),
    SetKeyImage { key: u8, data: Vec<u8> },
    SetSurfaceImage(Vec<u8>),
    /// Strip image; `rect` in strip-local coordinates, `None` for the whole strip
    SetStripImage { rect: Option<Rect>, data: Vec<u8> },
    FillKey { key: u8, color: Color },
    FillSurface(Color),
    ShowLogo,
}

impl Primitive {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::SetBrightness(_) => "set-brightness",
            Primitive::SetKeyImage { .. } => "set-key-image",
            Primitive::SetSurfaceImage(_) => "set-surface-image",
            Primitive::SetStripImage { rect: None, .. } => "set-strip-image",
            Primitive::SetStripImage { rect: Some(_), .. } => "set-strip-image-at",
            Primitive::FillKey { .. } => "fill-key",
            Primitive::FillSurface(_) => "fill-surface",
            Primitive::ShowLogo => "show-logo",
        }
    }
}

/// The core transport trait - all backends implement this
///
/// Callers never issue concurrent `apply` calls for one device; backends may
/// rely on that and need no internal command serialization.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Capability descriptor of the attached model
    fn capabilities(&self) -> &Capabilities;

    /// Execute one primitive, returning once the device has accepted it
    async fn apply(&self, primitive: &Primitive) -> Result<(), TransportError>;

    /// Subscribe to raw input reports.
    ///
    /// The channel closes when the link goes away, after which
    /// `is_connected` reports `false` and new subscriptions return `None`.
    /// Returns `None` if the transport has no input endpoint.
    fn subscribe_input(&self) -> Option<broadcast::Receiver<TimestampedReport>> {
        None
    }

    /// Check if transport is still connected
    async fn is_connected(&self) -> bool;

    /// Close the transport gracefully
    async fn close(&self) -> Result<(), TransportError>;
}

/// Type alias for a boxed transport
pub type BoxedTransport = Arc<dyn Transport>;

/// Opens a transport to one specific device
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<BoxedTransport, TransportError>;
}
