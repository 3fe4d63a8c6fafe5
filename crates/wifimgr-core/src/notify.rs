//! Notifications delivered to the application.

use serde::{Deserialize, Serialize};

use crate::command::CommandId;
use crate::config::WifiConfig;
use crate::error::WifiMgrError;
use crate::state::{ApState, StaState};
use crate::types::{MacAddr, Role, ScanEntry};

/// Snapshot of the station role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaStatus {
    pub state: StaState,
    pub own_mac: Option<MacAddr>,
    /// BSSID of the network joined, while connected.
    pub host_bssid: Option<MacAddr>,
    /// Link signal strength in dBm, while connected.
    pub rssi: Option<i8>,
}

/// Snapshot of the access point role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApStatus {
    pub state: ApState,
    pub own_mac: Option<MacAddr>,
    /// Stations currently associated.
    pub stations: Vec<MacAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum StatusReport {
    Station(StaStatus),
    AccessPoint(ApStatus),
}

/// Application-side receiver of manager notifications.
///
/// Every method defaults to doing nothing. Methods run on the manager's
/// worker or event task after the command lock is released, so they may call
/// back into the [`WifiManager`](crate::WifiManager). They must not block.
pub trait ControlCallbacks: Send + Sync {
    /// Reply to a get-config command.
    fn config(&self, _role: Role, _config: &WifiConfig) {}

    /// Reply to a get-status command.
    fn status(&self, _status: &StatusReport) {}

    fn scan_result(&self, _entry: &ScanEntry) {}

    /// End of a scan; `result` is 0 or a negative error number.
    fn scan_done(&self, _result: i32) {}

    /// Outcome of a connect command; `status` is 0 on success.
    fn connect(&self, _status: i32) {}

    fn disconnect(&self, _reason: i32) {}

    /// A station joined (`connected`) or left the SoftAP.
    fn new_station(&self, _connected: bool, _mac: MacAddr) {}

    /// The SoftAP stopped on its own.
    fn ap_failure(&self, _reason: i32) {}

    /// A submitted command was dropped without running, or its handler
    /// failed. Nothing changed on the device or in the manager.
    fn command_dropped(&self, _id: CommandId, _error: &WifiMgrError) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl ControlCallbacks for NoopCallbacks {}

/// A notification produced under the command lock and delivered after it is
/// released.
#[derive(Debug)]
pub(crate) enum Notice {
    Config(Role, WifiConfig),
    Status(StatusReport),
    ScanDone(i32),
    Connect(i32),
    Disconnect(i32),
    NewStation { connected: bool, mac: MacAddr },
    ApFailure(i32),
    Dropped(CommandId, WifiMgrError),
}

impl Notice {
    pub(crate) fn deliver(self, callbacks: &dyn ControlCallbacks) {
        match self {
            Notice::Config(role, config) => callbacks.config(role, &config),
            Notice::Status(status) => callbacks.status(&status),
            Notice::ScanDone(result) => callbacks.scan_done(result),
            Notice::Connect(status) => callbacks.connect(status),
            Notice::Disconnect(reason) => callbacks.disconnect(reason),
            Notice::NewStation { connected, mac } => callbacks.new_station(connected, mac),
            Notice::ApFailure(reason) => callbacks.ap_failure(reason),
            Notice::Dropped(id, error) => callbacks.command_dropped(id, &error),
        }
    }
}
