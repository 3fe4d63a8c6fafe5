//! Driver interface adapter.
//!
//! [`WifiDriver`] is the operation set a network-chip driver exposes.
//! [`DriverInterface`] wraps one driver: it checks arguments and the driver's
//! capability table before every call, and hands the driver completion
//! callbacks that turn raw results into [`WifiEvent`]s on the event channel.
//! Callbacks may run on any thread; they never see manager state.

use std::sync::Arc;

use crate::config::WifiConfig;
use crate::error::{DriverError, Result, WifiMgrError};
use crate::events::{EventSink, WifiEvent};
use crate::types::{MacAddr, Role, ScanEntry, ScanParams};

bitflags::bitflags! {
    /// Operations a driver implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DriverCapabilities: u32 {
        const OPEN = 1 << 0;
        const CLOSE = 1 << 1;
        const SCAN = 1 << 2;
        const CONNECT = 1 << 3;
        const DISCONNECT = 1 << 4;
        /// Signal strength of the current link.
        const GET_STATION = 1 << 5;
        const NOTIFY_IP = 1 << 6;
        const START_AP = 1 << 7;
        const STOP_AP = 1 << 8;
        const DEL_STATION = 1 << 9;
        const GET_MAC = 1 << 10;
    }
}

impl DriverCapabilities {
    /// Everything a station-only driver needs.
    pub fn station() -> Self {
        Self::OPEN
            | Self::CLOSE
            | Self::SCAN
            | Self::CONNECT
            | Self::DISCONNECT
            | Self::GET_STATION
            | Self::NOTIFY_IP
            | Self::GET_MAC
    }

    /// Everything an AP-only driver needs.
    pub fn access_point() -> Self {
        Self::OPEN | Self::CLOSE | Self::START_AP | Self::STOP_AP | Self::DEL_STATION | Self::GET_MAC
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Operation set of a network-chip driver.
///
/// Operations a driver does not advertise in [`capabilities`](Self::capabilities)
/// are never called. Non-blocking operations receive a callback and must
/// return as soon as the request is queued with the chip.
pub trait WifiDriver: Send + Sync {
    fn name(&self) -> &str {
        "wifi"
    }

    fn capabilities(&self) -> DriverCapabilities;

    /// One-time low-level initialization of a role (firmware load, interface
    /// creation). Called before the first command of that role.
    fn bring_up(&self, _role: Role) -> DriverResult<()> {
        Ok(())
    }

    fn open(&self, _role: Role) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    fn close(&self, _role: Role) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    /// Report every network found through `cb`, then finish with
    /// [`ScanCallback::on_done`].
    fn scan(&self, _params: &ScanParams, _cb: ScanCallback) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    /// Join the network in `config`. `cb` reports the outcome and, later, any
    /// loss of the link.
    fn connect(&self, _config: &WifiConfig, _cb: LinkCallback) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    fn disconnect(&self, _cb: LinkCallback) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    /// Signal strength of the current link in dBm.
    fn get_station(&self) -> DriverResult<i8> {
        Err(DriverError::Unimplemented)
    }

    fn notify_ip(&self, _addr: &[u8]) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    /// Start the SoftAP. `cb` reports stations joining and leaving.
    fn start_ap(&self, _config: &WifiConfig, _cb: ApCallback) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    fn stop_ap(&self) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    fn del_station(&self, _mac: &MacAddr) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    fn get_mac(&self, _role: Role) -> DriverResult<MacAddr> {
        Err(DriverError::Unimplemented)
    }
}

/// Completion callback of a scan.
#[derive(Debug, Clone)]
pub struct ScanCallback {
    sink: EventSink,
}

impl ScanCallback {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn on_entry(&self, entry: ScanEntry) {
        self.sink.notify(WifiEvent::ScanResult(entry));
    }

    /// `result` is 0 or a negative error number.
    pub fn on_done(&self, result: i32) {
        self.sink.notify(WifiEvent::ScanDone { result });
    }
}

/// Link state callback of the station role.
#[derive(Debug, Clone)]
pub struct LinkCallback {
    sink: EventSink,
}

impl LinkCallback {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn on_connect(&self, status: i32) {
        self.sink.notify(WifiEvent::Connect { status });
    }

    /// Solicited or not.
    pub fn on_disconnect(&self, reason: i32) {
        self.sink.notify(WifiEvent::Disconnect { reason });
    }
}

/// SoftAP callback.
#[derive(Debug, Clone)]
pub struct ApCallback {
    sink: EventSink,
}

impl ApCallback {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn on_new_station(&self, connected: bool, mac: MacAddr) {
        self.sink.notify(WifiEvent::NewStation { connected, mac });
    }

    pub fn on_failure(&self, reason: i32) {
        self.sink.notify(WifiEvent::ApFailure { reason });
    }
}

/// Checked front end of a [`WifiDriver`].
#[derive(Clone)]
pub struct DriverInterface {
    driver: Arc<dyn WifiDriver>,
    sink: EventSink,
}

impl DriverInterface {
    pub fn new(driver: Arc<dyn WifiDriver>, sink: EventSink) -> Self {
        Self { driver, sink }
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub fn capabilities(&self) -> DriverCapabilities {
        self.driver.capabilities()
    }

    pub fn supports(&self, caps: DriverCapabilities) -> bool {
        self.capabilities().contains(caps)
    }

    fn require(&self, cap: DriverCapabilities, op: &str) -> Result<()> {
        if self.supports(cap) {
            Ok(())
        } else {
            tracing::debug!(driver = self.name(), op, "operation not supported by driver");
            Err(WifiMgrError::not_supported(format!(
                "{op} not supported by driver {}",
                self.name()
            )))
        }
    }

    fn call<T>(&self, op: &str, result: DriverResult<T>) -> Result<T> {
        result.map_err(|e| {
            tracing::debug!(driver = self.name(), op, error = %e, "driver call failed");
            WifiMgrError::Driver(e)
        })
    }

    /// One-time initialization of `role` on interface `iface`.
    pub fn bring_up(&self, role: Role, iface: &str) -> Result<()> {
        self.driver.bring_up(role).map_err(|e| {
            WifiMgrError::DeviceUnavailable(format!("{role} bring-up on {iface} failed: {e}"))
        })
    }

    pub fn open(&self, role: Role) -> Result<()> {
        self.require(DriverCapabilities::OPEN, "open")?;
        self.call("open", self.driver.open(role))
    }

    pub fn close(&self, role: Role) -> Result<()> {
        self.require(DriverCapabilities::CLOSE, "close")?;
        self.call("close", self.driver.close(role))
    }

    pub fn scan(&self, params: &ScanParams) -> Result<()> {
        if !params.band.accepts_channel(params.channel) {
            return Err(WifiMgrError::invalid(format!(
                "channel {} is not valid for band {:?}",
                params.channel, params.band
            )));
        }
        self.require(DriverCapabilities::SCAN, "scan")?;
        let cb = ScanCallback::new(self.sink.clone());
        self.call("scan", self.driver.scan(params, cb))
    }

    pub fn connect(&self, config: &WifiConfig) -> Result<()> {
        if !config.has_ssid() {
            return Err(WifiMgrError::invalid("connect requires an SSID"));
        }
        self.require(DriverCapabilities::CONNECT, "connect")?;
        let cb = LinkCallback::new(self.sink.clone());
        self.call("connect", self.driver.connect(config, cb))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.require(DriverCapabilities::DISCONNECT, "disconnect")?;
        let cb = LinkCallback::new(self.sink.clone());
        self.call("disconnect", self.driver.disconnect(cb))
    }

    pub fn get_station(&self) -> Result<i8> {
        self.require(DriverCapabilities::GET_STATION, "get_station")?;
        self.call("get_station", self.driver.get_station())
    }

    /// Forward an IPv4 (4 bytes) or IPv6 (16 bytes) address.
    pub fn notify_ip(&self, addr: &[u8]) -> Result<()> {
        if addr.len() != 4 && addr.len() != 16 {
            return Err(WifiMgrError::invalid(format!(
                "IP address must be 4 or 16 bytes, got {}",
                addr.len()
            )));
        }
        self.require(DriverCapabilities::NOTIFY_IP, "notify_ip")?;
        self.call("notify_ip", self.driver.notify_ip(addr))
    }

    pub fn start_ap(&self, config: &WifiConfig) -> Result<()> {
        if !config.has_ssid() {
            return Err(WifiMgrError::invalid("start_ap requires an SSID"));
        }
        self.require(DriverCapabilities::START_AP, "start_ap")?;
        let cb = ApCallback::new(self.sink.clone());
        self.call("start_ap", self.driver.start_ap(config, cb))
    }

    pub fn stop_ap(&self) -> Result<()> {
        self.require(DriverCapabilities::STOP_AP, "stop_ap")?;
        self.call("stop_ap", self.driver.stop_ap())
    }

    pub fn del_station(&self, mac: &MacAddr) -> Result<()> {
        if mac.is_zero() || mac.is_broadcast() {
            return Err(WifiMgrError::invalid(format!("cannot remove station {mac}")));
        }
        self.require(DriverCapabilities::DEL_STATION, "del_station")?;
        self.call("del_station", self.driver.del_station(mac))
    }

    pub fn get_mac(&self, role: Role) -> Result<MacAddr> {
        self.require(DriverCapabilities::GET_MAC, "get_mac")?;
        self.call("get_mac", self.driver.get_mac(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventReceiver;
    use parking_lot::Mutex;

    /// Scan-only driver recording what it was asked to do.
    #[derive(Default)]
    struct ScanOnly {
        scans: Mutex<Vec<ScanParams>>,
    }

    impl WifiDriver for ScanOnly {
        fn capabilities(&self) -> DriverCapabilities {
            DriverCapabilities::SCAN | DriverCapabilities::CONNECT
        }

        fn scan(&self, params: &ScanParams, cb: ScanCallback) -> DriverResult<()> {
            self.scans.lock().push(*params);
            cb.on_entry(ScanEntry {
                ssid: "home".into(),
                bssid: MacAddr::new([2, 0, 0, 0, 0, 1]),
                band: crate::types::Band::TwoPointFour,
                channel: 6,
                rssi: -40,
            });
            cb.on_done(0);
            Ok(())
        }
    }

    fn adapter() -> (Arc<ScanOnly>, DriverInterface, EventReceiver) {
        let driver = Arc::new(ScanOnly::default());
        let (sink, rx) = EventSink::channel();
        (driver.clone(), DriverInterface::new(driver, sink), rx)
    }

    #[test]
    fn test_capability_checked() {
        let (_, iface, _rx) = adapter();
        assert!(matches!(iface.open(Role::Station), Err(WifiMgrError::NotSupported(_))));
        assert!(matches!(iface.stop_ap(), Err(WifiMgrError::NotSupported(_))));
        assert_eq!(iface.get_station().unwrap_err().errno(), -95);
    }

    #[test]
    fn test_arguments_checked_before_driver() {
        let (driver, iface, _rx) = adapter();
        assert!(matches!(
            iface.connect(&WifiConfig::default()),
            Err(WifiMgrError::InvalidArgument(_))
        ));
        assert!(matches!(
            iface.del_station(&MacAddr::BROADCAST),
            Err(WifiMgrError::InvalidArgument(_))
        ));
        assert!(matches!(
            iface.notify_ip(&[10, 0, 0]),
            Err(WifiMgrError::InvalidArgument(_))
        ));
        let bad = ScanParams {
            band: crate::types::Band::Five,
            channel: 6,
        };
        assert!(iface.scan(&bad).is_err());
        assert!(driver.scans.lock().is_empty());
    }

    #[test]
    fn test_advertised_but_unimplemented() {
        let (_, iface, _rx) = adapter();
        let err = iface.connect(&WifiConfig::new("home")).unwrap_err();
        assert_eq!(err, WifiMgrError::Driver(DriverError::Unimplemented));
    }

    #[test]
    fn test_scan_callback_publishes_events() {
        let (driver, iface, mut rx) = adapter();
        iface.scan(&ScanParams::default()).unwrap();
        assert_eq!(driver.scans.lock().len(), 1);

        match rx.try_recv().unwrap() {
            WifiEvent::ScanResult(entry) => assert_eq!(entry.ssid, "home"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), WifiEvent::ScanDone { result: 0 });
    }

    #[test]
    fn test_bring_up_defaults_to_ok() {
        let (_, iface, _rx) = adapter();
        assert!(iface.bring_up(Role::AccessPoint, "wlan1").is_ok());
    }
}
