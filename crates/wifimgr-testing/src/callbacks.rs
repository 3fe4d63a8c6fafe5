//! Recording implementation of the notification surface.

use std::time::Duration;

use parking_lot::Mutex;

use wifimgr_core::{
    CommandId, ControlCallbacks, MacAddr, Role, ScanEntry, StatusReport, WifiConfig, WifiMgrError,
};

/// One notification received from the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Config { role: Role, config: WifiConfig },
    Status(StatusReport),
    ScanResult(ScanEntry),
    ScanDone(i32),
    Connect(i32),
    Disconnect(i32),
    NewStation { connected: bool, mac: MacAddr },
    ApFailure(i32),
    Dropped { id: CommandId, error: WifiMgrError },
}

/// Stores every notification in arrival order.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    records: Mutex<Vec<Notification>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, notification: Notification) {
        tracing::trace!(?notification, "notification recorded");
        self.records.lock().push(notification);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.records.lock().clone()
    }

    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&Notification) -> bool,
    {
        self.records.lock().iter().filter(|n| pred(n)).count()
    }

    /// Commands reported as dropped, with the reason.
    pub fn dropped(&self) -> Vec<(CommandId, WifiMgrError)> {
        self.records
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Dropped { id, error } => Some((*id, error.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn scan_results(&self) -> Vec<ScanEntry> {
        self.records
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::ScanResult(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    /// Most recent status report.
    pub fn last_status(&self) -> Option<StatusReport> {
        self.records.lock().iter().rev().find_map(|n| match n {
            Notification::Status(status) => Some(status.clone()),
            _ => None,
        })
    }

    /// Most recent config reply for `role`.
    pub fn last_config(&self, role: Role) -> Option<WifiConfig> {
        self.records.lock().iter().rev().find_map(|n| match n {
            Notification::Config { role: r, config } if *r == role => Some(config.clone()),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Poll until `pred` holds over the recorded notifications. Returns
    /// `false` if `within` elapses first.
    pub async fn wait_until<F>(&self, within: Duration, pred: F) -> bool
    where
        F: Fn(&[Notification]) -> bool,
    {
        let poll = async {
            loop {
                if pred(&self.records.lock()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(within, poll).await.is_ok()
    }

    /// Wait until at least `n` notifications match `pred`.
    pub async fn wait_for_count<F>(&self, within: Duration, n: usize, pred: F) -> bool
    where
        F: Fn(&Notification) -> bool,
    {
        self.wait_until(within, |records| records.iter().filter(|r| pred(r)).count() >= n)
            .await
    }
}

impl ControlCallbacks for RecordingCallbacks {
    fn config(&self, role: Role, config: &WifiConfig) {
        self.push(Notification::Config {
            role,
            config: config.clone(),
        });
    }

    fn status(&self, status: &StatusReport) {
        self.push(Notification::Status(status.clone()));
    }

    fn scan_result(&self, entry: &ScanEntry) {
        self.push(Notification::ScanResult(entry.clone()));
    }

    fn scan_done(&self, result: i32) {
        self.push(Notification::ScanDone(result));
    }

    fn connect(&self, status: i32) {
        self.push(Notification::Connect(status));
    }

    fn disconnect(&self, reason: i32) {
        self.push(Notification::Disconnect(reason));
    }

    fn new_station(&self, connected: bool, mac: MacAddr) {
        self.push(Notification::NewStation { connected, mac });
    }

    fn ap_failure(&self, reason: i32) {
        self.push(Notification::ApFailure(reason));
    }

    fn command_dropped(&self, id: CommandId, error: &WifiMgrError) {
        self.push(Notification::Dropped {
            id,
            error: error.clone(),
        });
    }
}
