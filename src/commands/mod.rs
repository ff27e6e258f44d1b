//! Command handlers for the CLI application.
//!
//! - `query`: read-only commands (list, info)
//! - `set`: drawing and settings (brightness, fill, image, logo)
//! - `watch`: input event monitor

pub mod query;
pub mod set;
pub mod watch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use deck_device::Device;
use deck_transport::HidConnector;
use tracing::debug;

use crate::config::DaemonConfig;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Settings every handler needs
pub struct Context {
    pub config: DaemonConfig,
    /// Device serial from the command line, overriding the config file
    pub serial: Option<String>,
}

impl Context {
    fn serial(&self) -> Option<String> {
        self.serial.clone().or_else(|| self.config.serial.clone())
    }
}

/// Open the preferred device and start its session.
///
/// Applies the configured startup brightness, if any.
pub async fn open_device(ctx: &Context) -> anyhow::Result<Device> {
    let connector = HidConnector::new(ctx.serial());
    let device = Device::new(connector, ctx.config.session.clone());
    device.start().await.context("opening device")?;

    if let Some(brightness) = ctx.config.brightness {
        debug!("Applying configured brightness {}%", brightness);
        device.set_brightness(brightness);
    }
    Ok(device)
}

/// Wait for queued commands to reach the device, then close it
pub async fn finish(device: Device) {
    device.sync().await;
    device.close();
    device.closed().await;
}

/// Set up a Ctrl-C handler that sets the given flag to false when triggered.
/// Returns the Arc<AtomicBool> for use in the main loop.
pub fn setup_interrupt_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .ok();

    running
}
