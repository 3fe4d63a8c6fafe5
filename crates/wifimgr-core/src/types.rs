//! Small value types shared across the manager.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of an Ethernet/802.11 hardware address.
pub const ETH_ALEN: usize = 6;

/// Operating role of the WiFi interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Client mode.
    Station,
    /// SoftAP / host mode.
    AccessPoint,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Station => "sta",
            Role::AccessPoint => "ap",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 48-bit hardware address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; ETH_ALEN]);
    pub const BROADCAST: MacAddr = MacAddr([0xff; ETH_ALEN]);

    pub fn new(bytes: [u8; ETH_ALEN]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; ETH_ALEN]
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; ETH_ALEN]
    }
}

impl From<[u8; ETH_ALEN]> for MacAddr {
    fn from(bytes: [u8; ETH_ALEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl std::str::FromStr for MacAddr {
    type Err = crate::WifiMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; ETH_ALEN];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| crate::WifiMgrError::invalid(format!("short MAC address: {s}")))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| crate::WifiMgrError::invalid(format!("bad MAC octet: {part}")))?;
        }
        if parts.next().is_some() {
            return Err(crate::WifiMgrError::invalid(format!("long MAC address: {s}")));
        }
        Ok(Self(bytes))
    }
}

/// Radio band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    /// Let the driver choose.
    #[default]
    Auto,
    /// 2.4 GHz.
    TwoPointFour,
    /// 5 GHz.
    Five,
}

impl Band {
    /// Whether `channel` is a valid primary channel for this band.
    /// Channel 0 means "any" and is always accepted.
    pub fn accepts_channel(self, channel: u8) -> bool {
        let in_24 = (1..=14).contains(&channel);
        let in_5 = (36..=165).contains(&channel);
        channel == 0
            || match self {
                Band::Auto => in_24 || in_5,
                Band::TwoPointFour => in_24,
                Band::Five => in_5,
            }
    }

    /// Band a channel number belongs to.
    pub fn for_channel(channel: u8) -> Band {
        match channel {
            1..=14 => Band::TwoPointFour,
            36..=165 => Band::Five,
            _ => Band::Auto,
        }
    }
}

/// Parameters of a scan request. Zero values mean "all".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanParams {
    pub band: Band,
    pub channel: u8,
}

/// One network found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub ssid: String,
    pub bssid: MacAddr,
    pub band: Band,
    pub channel: u8,
    /// Signal strength in dBm.
    pub rssi: i8,
}
