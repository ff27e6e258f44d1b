//! Daemon configuration
//!
//! Loaded from `~/.config/deckd/config.toml`; a missing file means defaults.
//!
//! ```toml
//! log_level = "debug"
//! brightness = 60
//! serial = "A00SA3232MXB2D"
//!
//! [session]
//! jpeg_quality = 85
//! default_scale_mode = "fill"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use deck_device::SessionConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Used when neither `RUST_LOG` nor `--log-level` is given
    pub log_level: Option<String>,
    /// Applied right after a device is opened
    pub brightness: Option<u8>,
    /// Preferred device
    pub serial: Option<String>,
    pub session: SessionConfig,
}

impl DaemonConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deckd")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
