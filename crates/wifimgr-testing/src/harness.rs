//! A manager wired to the simulated driver and recording callbacks.

use std::sync::Arc;
use std::time::Duration;

use wifimgr_core::{ManagerConfig, Result, Role, WifiManager};

use crate::callbacks::{Notification, RecordingCallbacks};
use crate::driver::SimulatedDriver;

/// Default time scenario helpers wait for a notification.
pub const WAIT: Duration = Duration::from_secs(2);

pub struct Harness {
    pub manager: WifiManager,
    pub driver: Arc<SimulatedDriver>,
    pub callbacks: Arc<RecordingCallbacks>,
}

impl Harness {
    /// Start a manager over `driver` with default config.
    pub fn new(driver: SimulatedDriver) -> Result<Self> {
        Self::with_config(driver, ManagerConfig::default())
    }

    pub fn with_config(driver: SimulatedDriver, config: ManagerConfig) -> Result<Self> {
        let driver = Arc::new(driver);
        let callbacks = Arc::new(RecordingCallbacks::new());
        let manager = WifiManager::new(driver.clone(), callbacks.clone(), config)?;
        Ok(Self {
            manager,
            driver,
            callbacks,
        })
    }

    /// Wait until every command queued so far has run.
    ///
    /// Queues a station config query behind them and waits for its reply, so
    /// it must not be mixed with station config queries still in flight.
    pub async fn flush(&self) -> bool {
        let is_config = |n: &Notification| {
            matches!(
                n,
                Notification::Config {
                    role: Role::Station,
                    ..
                }
            )
        };
        let before = self.callbacks.count(is_config);
        if self.manager.get_sta_config().is_err() {
            return false;
        }
        self.callbacks.wait_for_count(WAIT, before + 1, is_config).await
    }

    /// Wait for `n` notifications matching `pred`.
    pub async fn expect<F>(&self, n: usize, pred: F) -> bool
    where
        F: Fn(&Notification) -> bool,
    {
        self.callbacks.wait_for_count(WAIT, n, pred).await
    }
}
