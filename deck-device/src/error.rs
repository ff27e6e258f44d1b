//! Device session error types

use deck_transport::{CapabilityError, TransportError};
use thiserror::Error;

use crate::device::DeviceState;

/// Errors from opening a device session.
///
/// Once a session is running, failures are reported as state transitions,
/// never as errors returned to producers.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Device speaks a protocol generation this build does not drive
    #[error("Unsupported protocol version {found} (supported: {supported:?})")]
    VersionMismatch { found: u8, supported: Vec<u8> },

    /// Capability descriptor failed validation
    #[error("Invalid capability descriptor: {0}")]
    InvalidCapabilities(#[from] CapabilityError),

    /// Operation not allowed in the current lifecycle state
    #[error("Operation not allowed in state {0:?}")]
    InvalidState(DeviceState),
}
