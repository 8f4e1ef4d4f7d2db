//! Driver configuration types.
//!
//! `UartConfig` is loaded from TOML (or built from defaults) and validated
//! before activation. Transfer-policy handling is an explicit named option
//! rather than a silent default, see [`TransferPolicy`].

use crate::error::{UartError, UartResult};
use crate::regs::REG_BLOCK_LEN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default device name, also used for the node
fn default_device_name() -> String {
    "uart".to_string()
}

/// Default status attribute name
fn default_status_attr() -> String {
    "log".to_string()
}

/// Default physical base address (PL011 UART0 on the BCM2711)
fn default_base_addr() -> u64 {
    0xFE20_1000
}

/// Default register block size
fn default_reg_size() -> usize {
    REG_BLOCK_LEN
}

/// Default hardware-ready poll budget
fn default_poll_budget() -> u32 {
    100_000
}

/// How requests longer than one byte are transferred.
///
/// The hardware moves one byte per data-register access either way; the
/// policy decides whether a call loops over the caller's whole buffer or
/// stops after the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferPolicy {
    /// Transfer exactly one byte per call regardless of requested length
    #[default]
    SingleByte,
    /// Transfer until the buffer is exhausted or the hardware underruns
    /// (read) / stays busy (write); the burst is one exclusive transaction
    FillBuffer,
}

/// Driver configuration, loaded from TOML or built from defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UartConfig {
    /// Device name registered with the host; also the node name
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Name of the read-only diagnostic attribute attached to the node
    #[serde(default = "default_status_attr")]
    pub status_attr: String,

    /// Physical address of the register block
    #[serde(default = "default_base_addr")]
    pub base_addr: u64,

    /// Size of the register block mapping in bytes
    #[serde(default = "default_reg_size")]
    pub reg_size: usize,

    /// Maximum number of status polls before a hardware-ready wait is
    /// reported as `NotReady`
    #[serde(default = "default_poll_budget")]
    pub poll_budget: u32,

    /// Multi-byte request handling
    #[serde(default)]
    pub transfer_policy: TransferPolicy,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            status_attr: default_status_attr(),
            base_addr: default_base_addr(),
            reg_size: default_reg_size(),
            poll_budget: default_poll_budget(),
            transfer_policy: TransferPolicy::default(),
        }
    }
}

impl UartConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> UartResult<Self> {
        toml::from_str(content).map_err(|e| UartError::Config {
            reason: format!("failed to parse config: {e}"),
        })
    }

    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> UartResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| UartError::Config {
            reason: format!("failed to read config file {path:?}: {e}"),
        })?;
        Self::from_toml(&content)
    }

    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `device_name` non-empty, no path separators
    /// 2. `status_attr` non-empty, no path separators
    /// 3. `reg_size` covers the full register map
    /// 4. `base_addr` word-aligned
    /// 5. `poll_budget` > 0
    pub fn validate(&self) -> UartResult<()> {
        if self.device_name.is_empty() || self.device_name.contains('/') {
            return Err(UartError::Config {
                reason: format!("invalid device name: {:?}", self.device_name),
            });
        }

        if self.status_attr.is_empty() || self.status_attr.contains('/') {
            return Err(UartError::Config {
                reason: format!("invalid attribute name: {:?}", self.status_attr),
            });
        }

        if self.reg_size < REG_BLOCK_LEN {
            return Err(UartError::Config {
                reason: format!(
                    "register block size {:#x} smaller than the register map ({REG_BLOCK_LEN:#x})",
                    self.reg_size
                ),
            });
        }

        if self.base_addr % 4 != 0 {
            return Err(UartError::Config {
                reason: format!("base address {:#x} not word-aligned", self.base_addr),
            });
        }

        if self.poll_budget == 0 {
            return Err(UartError::Config {
                reason: "poll_budget must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = UartConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device_name, "uart");
        assert_eq!(config.status_attr, "log");
        assert_eq!(config.base_addr, 0xFE20_1000);
        assert_eq!(config.transfer_policy, TransferPolicy::SingleByte);
    }

    #[test]
    fn test_parse_with_overrides() {
        let config = UartConfig::from_toml(
            r#"
            device_name = "uart1"
            base_addr = 0xFE201400
            poll_budget = 500
            transfer_policy = "fill-buffer"
            "#,
        )
        .expect("parse");

        assert_eq!(config.device_name, "uart1");
        assert_eq!(config.base_addr, 0xFE20_1400);
        assert_eq!(config.poll_budget, 500);
        assert_eq!(config.transfer_policy, TransferPolicy::FillBuffer);
        // Omitted fields keep their defaults
        assert_eq!(config.status_attr, "log");
        assert_eq!(config.reg_size, REG_BLOCK_LEN);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = UartConfig::default();
        config.poll_budget = 0;
        assert!(matches!(config.validate(), Err(UartError::Config { .. })));

        let mut config = UartConfig::default();
        config.reg_size = 0x10;
        assert!(config.validate().is_err());

        let mut config = UartConfig::default();
        config.base_addr = 0xFE20_1001;
        assert!(config.validate().is_err());

        let mut config = UartConfig::default();
        config.device_name = "a/b".to_string();
        assert!(config.validate().is_err());
    }
}
