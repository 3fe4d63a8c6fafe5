//! Simulated network-chip driver.
//!
//! Implements every driver operation against in-memory state. Completions
//! are delivered according to the [`Completion`] mode, and tests can inject
//! the unsolicited events a real chip produces (link loss, stations joining,
//! SoftAP failure).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use wifimgr_core::{
    ApCallback, Band, DriverCapabilities, DriverError, DriverResult, LinkCallback, MacAddr, Role,
    ScanCallback, ScanEntry, ScanParams, WifiConfig, WifiDriver,
};

/// How asynchronous operations complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The callback runs before the operation returns.
    Immediate,
    /// The callback runs on a tokio task after the given delay.
    Delayed(Duration),
    /// Nothing happens until the test calls one of the `complete_*` methods.
    Manual,
}

#[derive(Default)]
struct SimState {
    networks: Vec<ScanEntry>,
    pending_scan: Option<ScanCallback>,
    link: Option<LinkCallback>,
    pending_connect: bool,
    connected: bool,
    ap: Option<ApCallback>,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, DriverError>,
    bring_up_failure: Option<DriverError>,
}

pub struct SimulatedDriver {
    capabilities: DriverCapabilities,
    completion: Completion,
    connect_status: i32,
    rssi: i8,
    latency: Option<Duration>,
    sta_mac: MacAddr,
    ap_mac: MacAddr,
    state: Mutex<SimState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    /// Driver with every capability, immediate completions and no networks.
    pub fn new() -> Self {
        Self {
            capabilities: DriverCapabilities::all(),
            completion: Completion::Immediate,
            connect_status: 0,
            rssi: -52,
            latency: None,
            sta_mac: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            ap_mac: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]),
            state: Mutex::new(SimState::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    /// Status every connect attempt completes with.
    pub fn with_connect_status(mut self, status: i32) -> Self {
        self.connect_status = status;
        self
    }

    pub fn with_networks(self, networks: Vec<ScanEntry>) -> Self {
        self.state.lock().networks = networks;
        self
    }

    /// Populate the scan table with `count` random networks.
    pub fn with_random_networks(self, count: usize) -> Self {
        let networks = (0..count).map(random_network).collect();
        self.with_networks(networks)
    }

    /// Block inside every operation for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make role bring-up fail.
    pub fn fail_bring_up(&self, error: DriverError) {
        self.state.lock().bring_up_failure = Some(error);
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: &'static str, error: DriverError) {
        self.state.lock().failures.insert(op, error);
    }

    pub fn sta_mac(&self) -> MacAddr {
        self.sta_mac
    }

    pub fn ap_mac(&self) -> MacAddr {
        self.ap_mac
    }

    /// Operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Highest number of driver operations observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn ap_running(&self) -> bool {
        self.state.lock().ap.is_some()
    }

    /// Finish a scan started in [`Completion::Manual`] mode.
    pub fn complete_scan(&self, result: i32) -> bool {
        let (cb, networks) = {
            let mut state = self.state.lock();
            match state.pending_scan.take() {
                Some(cb) => (cb, state.networks.clone()),
                None => return false,
            }
        };
        report_scan(&cb, networks, result);
        true
    }

    /// Finish a connect started in [`Completion::Manual`] mode.
    pub fn complete_connect(&self, status: i32) -> bool {
        let cb = {
            let mut state = self.state.lock();
            if !state.pending_connect {
                return false;
            }
            state.pending_connect = false;
            state.connected = status == 0;
            state.link.clone()
        };
        match cb {
            Some(cb) => {
                cb.on_connect(status);
                true
            }
            None => false,
        }
    }

    /// Drop the link as if the access point went away.
    pub fn inject_disconnect(&self, reason: i32) -> bool {
        let cb = {
            let mut state = self.state.lock();
            state.connected = false;
            state.link.clone()
        };
        match cb {
            Some(cb) => {
                cb.on_disconnect(reason);
                true
            }
            None => false,
        }
    }

    /// A station joins or leaves the SoftAP.
    pub fn inject_station(&self, connected: bool, mac: MacAddr) -> bool {
        let cb = self.state.lock().ap.clone();
        match cb {
            Some(cb) => {
                cb.on_new_station(connected, mac);
                true
            }
            None => false,
        }
    }

    /// The SoftAP goes down on its own.
    pub fn inject_ap_failure(&self, reason: i32) -> bool {
        let cb = self.state.lock().ap.take();
        match cb {
            Some(cb) => {
                cb.on_failure(reason);
                true
            }
            None => false,
        }
    }

    /// Record the call, apply latency and return any scripted failure.
    fn enter(&self, op: &'static str) -> DriverResult<OpGuard<'_>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = OpGuard(&self.in_flight);

        let failure = {
            let mut state = self.state.lock();
            state.calls.push(op);
            state.failures.remove(op)
        };
        tracing::trace!(op, "simulated driver call");
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(guard),
        }
    }

    fn deliver<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.completion {
            Completion::Immediate => f(),
            Completion::Delayed(after) => {
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    f();
                });
            }
            Completion::Manual => {}
        }
    }
}

struct OpGuard<'a>(&'a AtomicUsize);

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn report_scan(cb: &ScanCallback, networks: Vec<ScanEntry>, result: i32) {
    for entry in networks {
        cb.on_entry(entry);
    }
    cb.on_done(result);
}

fn random_network(i: usize) -> ScanEntry {
    let mut rng = rand::thread_rng();
    let mut bssid = [0u8; 6];
    rng.fill(&mut bssid[..]);
    bssid[0] = (bssid[0] & 0xfe) | 0x02;
    let five = rng.gen_bool(0.3);
    let channel = if five {
        [36u8, 40, 44, 48, 149, 153][rng.gen_range(0..6)]
    } else {
        rng.gen_range(1..=13)
    };
    ScanEntry {
        ssid: format!("net-{i}"),
        bssid: MacAddr::new(bssid),
        band: Band::for_channel(channel),
        channel,
        rssi: rng.gen_range(-90..=-30),
    }
}

impl WifiDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.capabilities
    }

    fn bring_up(&self, _role: Role) -> DriverResult<()> {
        let _op = self.enter("bring_up")?;
        match self.state.lock().bring_up_failure.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn open(&self, _role: Role) -> DriverResult<()> {
        self.enter("open").map(drop)
    }

    fn close(&self, role: Role) -> DriverResult<()> {
        let _op = self.enter("close")?;
        let mut state = self.state.lock();
        match role {
            Role::Station => {
                state.link = None;
                state.connected = false;
                state.pending_scan = None;
                state.pending_connect = false;
            }
            Role::AccessPoint => state.ap = None,
        }
        Ok(())
    }

    fn scan(&self, params: &ScanParams, cb: ScanCallback) -> DriverResult<()> {
        let _op = self.enter("scan")?;
        let networks: Vec<ScanEntry> = {
            let mut state = self.state.lock();
            if state.pending_scan.is_some() {
                return Err(DriverError::Busy);
            }
            state
                .networks
                .iter()
                .filter(|n| params.channel == 0 || n.channel == params.channel)
                .filter(|n| params.band == Band::Auto || n.band == params.band)
                .cloned()
                .collect()
        };
        if self.completion == Completion::Manual {
            self.state.lock().pending_scan = Some(cb);
        } else {
            self.deliver(move || report_scan(&cb, networks, 0));
        }
        Ok(())
    }

    fn connect(&self, config: &WifiConfig, cb: LinkCallback) -> DriverResult<()> {
        let _op = self.enter("connect")?;
        let status = self.connect_status;
        {
            let mut state = self.state.lock();
            state.link = Some(cb.clone());
            if self.completion == Completion::Manual {
                state.pending_connect = true;
                return Ok(());
            }
            state.connected = status == 0;
        }
        tracing::debug!(ssid = %config.ssid, status, "simulated connect");
        self.deliver(move || cb.on_connect(status));
        Ok(())
    }

    fn disconnect(&self, cb: LinkCallback) -> DriverResult<()> {
        let _op = self.enter("disconnect")?;
        {
            let mut state = self.state.lock();
            state.connected = false;
            state.link = Some(cb.clone());
        }
        self.deliver(move || cb.on_disconnect(0));
        Ok(())
    }

    fn get_station(&self) -> DriverResult<i8> {
        let _op = self.enter("get_station")?;
        if self.state.lock().connected {
            Ok(self.rssi)
        } else {
            Err(DriverError::Io)
        }
    }

    fn notify_ip(&self, _addr: &[u8]) -> DriverResult<()> {
        self.enter("notify_ip").map(drop)
    }

    fn start_ap(&self, config: &WifiConfig, cb: ApCallback) -> DriverResult<()> {
        let _op = self.enter("start_ap")?;
        tracing::debug!(ssid = %config.ssid, channel = config.channel, "simulated SoftAP up");
        self.state.lock().ap = Some(cb);
        Ok(())
    }

    fn stop_ap(&self) -> DriverResult<()> {
        let _op = self.enter("stop_ap")?;
        self.state.lock().ap = None;
        Ok(())
    }

    fn del_station(&self, _mac: &MacAddr) -> DriverResult<()> {
        self.enter("del_station").map(drop)
    }

    fn get_mac(&self, role: Role) -> DriverResult<MacAddr> {
        let _op = self.enter("get_mac")?;
        Ok(match role {
            Role::Station => self.sta_mac,
            Role::AccessPoint => self.ap_mac,
        })
    }
}
