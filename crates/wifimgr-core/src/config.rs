//! Manager and per-role configuration.
//!
//! [`ManagerConfig`] holds the tunables of the manager itself and can be
//! overlaid from the environment or parsed from JSON. [`WifiConfig`] is the
//! SSID/BSSID/passphrase/channel/band tuple each role keeps between commands.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WifiMgrError};
use crate::types::{Band, MacAddr, Role};

/// Maximum SSID length in bytes.
pub const MAX_SSID_LEN: usize = 32;
/// Maximum passphrase length in bytes.
pub const MAX_PASSPHRASE_LEN: usize = 64;
/// Minimum passphrase length in bytes when one is given.
pub const MIN_PASSPHRASE_LEN: usize = 8;

/// Default values.
pub mod defaults {
    /// Depth of the command queue.
    pub const CMD_QUEUE_DEPTH: usize = 16;
    pub const SCAN_TIMEOUT_MS: u64 = 10_000;
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
    pub const DISCONNECT_TIMEOUT_MS: u64 = 5_000;
    pub const STA_IFACE_NAME: &str = "wlan0";
    pub const AP_IFACE_NAME: &str = "wlan1";
}

/// Environment variable names.
pub mod env_vars {
    pub const CMD_QUEUE_DEPTH: &str = "WIFIMGR_CMD_QUEUE_DEPTH";
    pub const SCAN_TIMEOUT_MS: &str = "WIFIMGR_SCAN_TIMEOUT_MS";
    pub const CONNECT_TIMEOUT_MS: &str = "WIFIMGR_CONNECT_TIMEOUT_MS";
    pub const DISCONNECT_TIMEOUT_MS: &str = "WIFIMGR_DISCONNECT_TIMEOUT_MS";

    pub(super) fn parse<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
    }
}

/// Manager tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of queued, not yet processed commands.
    pub cmd_queue_depth: usize,
    /// Time allowed between a scan request and its scan-done event.
    pub scan_timeout_ms: u64,
    /// Time allowed between a connect request and its connect event.
    pub connect_timeout_ms: u64,
    /// Time allowed between a disconnect request and its disconnect event.
    pub disconnect_timeout_ms: u64,
    pub sta_iface_name: String,
    pub ap_iface_name: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cmd_queue_depth: defaults::CMD_QUEUE_DEPTH,
            scan_timeout_ms: defaults::SCAN_TIMEOUT_MS,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            disconnect_timeout_ms: defaults::DISCONNECT_TIMEOUT_MS,
            sta_iface_name: defaults::STA_IFACE_NAME.to_string(),
            ap_iface_name: defaults::AP_IFACE_NAME.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Defaults overlaid with any `WIFIMGR_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay `WIFIMGR_*` environment variables on this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(depth) = env_vars::parse(env_vars::CMD_QUEUE_DEPTH) {
            self.cmd_queue_depth = depth;
        }
        if let Some(ms) = env_vars::parse(env_vars::SCAN_TIMEOUT_MS) {
            self.scan_timeout_ms = ms;
        }
        if let Some(ms) = env_vars::parse(env_vars::CONNECT_TIMEOUT_MS) {
            self.connect_timeout_ms = ms;
        }
        if let Some(ms) = env_vars::parse(env_vars::DISCONNECT_TIMEOUT_MS) {
            self.disconnect_timeout_ms = ms;
        }
        self
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| WifiMgrError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cmd_queue_depth == 0 {
            return Err(WifiMgrError::Config(
                "cmd_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Network interface the driver brings up for `role`.
    pub fn iface_name(&self, role: Role) -> &str {
        match role {
            Role::Station => &self.sta_iface_name,
            Role::AccessPoint => &self.ap_iface_name,
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

/// Per-role network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub bssid: MacAddr,
    pub passphrase: String,
    /// Primary channel, 0 for automatic selection.
    pub channel: u8,
    pub band: Band,
}

impl WifiConfig {
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            ..Default::default()
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = passphrase.into();
        self
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_band(mut self, band: Band) -> Self {
        self.band = band;
        self
    }

    pub fn with_bssid(mut self, bssid: MacAddr) -> Self {
        self.bssid = bssid;
        self
    }

    pub fn has_ssid(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// Check field bounds. An entirely empty config is valid; it clears the
    /// stored one.
    pub fn validate(&self) -> Result<()> {
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(WifiMgrError::invalid(format!(
                "SSID is {} bytes, limit is {MAX_SSID_LEN}",
                self.ssid.len()
            )));
        }
        if !self.passphrase.is_empty()
            && !(MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&self.passphrase.len())
        {
            return Err(WifiMgrError::invalid(format!(
                "passphrase must be {MIN_PASSPHRASE_LEN}..={MAX_PASSPHRASE_LEN} bytes"
            )));
        }
        if !self.band.accepts_channel(self.channel) {
            return Err(WifiMgrError::invalid(format!(
                "channel {} is not valid for band {:?}",
                self.channel, self.band
            )));
        }
        Ok(())
    }
}
