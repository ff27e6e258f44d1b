//! Session tuning knobs

use serde::{Deserialize, Serialize};

use crate::imaging::ScaleMode;

/// Per-device session configuration.
///
/// Every field has a default, so an empty TOML table is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Buffered typed input events per subscriber
    pub input_channel_capacity: usize,
    /// JPEG quality for image primitives (1-100)
    pub jpeg_quality: u8,
    /// Wire protocol generations this build can drive
    pub supported_protocols: Vec<u8>,
    pub default_scale_mode: ScaleMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_channel_capacity: 64,
            jpeg_quality: 90,
            supported_protocols: vec![2],
            default_scale_mode: ScaleMode::Fit,
        }
    }
}

impl SessionConfig {
    pub fn supports_protocol(&self, version: u8) -> bool {
        self.supported_protocols.contains(&version)
    }
}
