//! Command pipeline and session façade for Stream Deck class devices
//!
//! Sits on top of any [`deck_transport::Transport`] and provides:
//!
//! - a coalescing command queue drained by one consumer task per device
//! - a dirty-region tracker that turns invalidation marks into the minimal
//!   set of partial updates for the connected model
//! - an input decoder turning bitmask snapshots into edge-triggered events
//! - [`Device`], the façade applications hold on to
//!
//! ```no_run
//! use deck_device::{Device, SessionConfig};
//! use deck_transport::{Color, HidConnector};
//!
//! # async fn demo() -> Result<(), deck_device::DeviceError> {
//! let device = Device::new(HidConnector::new(None), SessionConfig::default());
//! device.start().await?;
//! device.set_brightness(60);
//! device.fill_key(0, Color::new(255, 0, 0));
//! device.sync().await;
//! device.close();
//! device.closed().await;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod device;
pub mod dirty;
pub mod error;
pub mod imaging;
pub mod input;
pub mod queue;

mod executor;

pub use command::{Command, Image, Task};
pub use config::SessionConfig;
pub use device::{Device, DeviceState, KeyHandle};
pub use dirty::{DirtyTracker, InvalidationMark};
pub use error::DeviceError;
pub use imaging::ScaleMode;
pub use input::{BitmaskDiff, FlingDirection, InputDecoder, InputEvent};
pub use queue::CommandQueue;
