//! Probe configuration.
//!
//! Stored as JSON. Every field is optional in the file; missing fields take
//! the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::framing::DEFAULT_PAD;
use crate::{pids, safety, REALTEK_VID};

/// Settings shared by the probe and the single-command path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// USB vendor ID of the HID bridge.
    pub vendor_id: u16,
    /// USB product ID of the HID bridge.
    pub product_id: u16,
    /// Pause between submissions within a round, in milliseconds.
    pub inter_command_delay_ms: u64,
    /// Buffer size for the padded framing strategies.
    pub pad_to: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            vendor_id: REALTEK_VID,
            product_id: pids::PL81_PRO,
            inter_command_delay_ms: 0,
            pad_to: DEFAULT_PAD,
        }
    }
}

impl ProbeConfig {
    pub fn inter_command_delay(&self) -> Duration {
        Duration::from_millis(self.inter_command_delay_ms)
    }

    /// Parse a config from JSON text and validate it.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        safety::validate_pad_to(self.pad_to)?;
        Ok(())
    }
}

/// Load a config file.
pub fn load_config(path: &Path) -> Result<ProbeConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    ProbeConfig::from_json(&text)
}
