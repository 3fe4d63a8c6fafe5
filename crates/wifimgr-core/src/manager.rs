//! The manager context.
//!
//! A [`WifiManager`] is an explicitly constructed value; any number of them
//! can coexist, each with its own driver, worker and event dispatcher.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wifimgr_core::{ManagerConfig, NoopCallbacks, WifiConfig, WifiManager};
//!
//! let manager = WifiManager::new(driver, Arc::new(NoopCallbacks), ManagerConfig::from_env())?;
//! manager.set_sta_config(WifiConfig::new("home").with_passphrase("secret-pass"))?;
//! manager.open_sta()?;
//! manager.connect()?;
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::command::{Command, CommandId};
use crate::config::{ManagerConfig, WifiConfig};
use crate::context::{Core, Shared};
use crate::driver::{DriverInterface, WifiDriver};
use crate::error::Result;
use crate::events::{run_event_loop, EventDispatcher, EventSink};
use crate::notify::ControlCallbacks;
use crate::processor::{CommandProcessor, CommandSender};
use crate::state::{ApState, StaState};
use crate::types::{MacAddr, ScanParams};

pub struct WifiManager {
    shared: Arc<Shared>,
    sender: CommandSender,
    processor: tokio::sync::Mutex<CommandProcessor>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl WifiManager {
    /// Build a manager around `driver` and start its worker and event tasks.
    /// Must be called from within a tokio runtime.
    pub fn new(
        driver: Arc<dyn WifiDriver>,
        callbacks: Arc<dyn ControlCallbacks>,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (sink, events) = EventSink::channel();
        let dispatcher = Arc::new(EventDispatcher::new());
        let driver = DriverInterface::new(driver, sink.clone());
        tracing::info!(
            driver = driver.name(),
            capabilities = ?driver.capabilities(),
            queue_depth = config.cmd_queue_depth,
            "starting wifi manager"
        );

        let depth = config.cmd_queue_depth;
        let shared = Arc::new(Shared {
            core: Mutex::new(Core::default()),
            driver,
            dispatcher: dispatcher.clone(),
            callbacks,
            config,
            sink,
        });

        let event_loop = tokio::spawn(run_event_loop(dispatcher, events));
        let (processor, sender) = CommandProcessor::start(shared.clone(), depth);

        Ok(Self {
            shared,
            sender,
            processor: tokio::sync::Mutex::new(processor),
            event_loop: Mutex::new(Some(event_loop)),
        })
    }

    /// Queue `command` for the worker. Returns once it is queued; the outcome
    /// is reported through the callbacks.
    pub fn submit(&self, command: Command) -> Result<()> {
        self.sender.submit(command)
    }

    /// A cloneable handle that can submit commands from other tasks.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn set_sta_config(&self, config: WifiConfig) -> Result<()> {
        self.submit(Command::SetStaConfig(config))
    }

    pub fn set_ap_config(&self, config: WifiConfig) -> Result<()> {
        self.submit(Command::SetApConfig(config))
    }

    pub fn get_sta_config(&self) -> Result<()> {
        self.submit(Command::GetStaConfig)
    }

    pub fn get_ap_config(&self) -> Result<()> {
        self.submit(Command::GetApConfig)
    }

    pub fn get_sta_status(&self) -> Result<()> {
        self.submit(Command::GetStaStatus)
    }

    pub fn get_ap_status(&self) -> Result<()> {
        self.submit(Command::GetApStatus)
    }

    pub fn open_sta(&self) -> Result<()> {
        self.submit(Command::OpenSta)
    }

    pub fn close_sta(&self) -> Result<()> {
        self.submit(Command::CloseSta)
    }

    pub fn scan(&self, params: ScanParams) -> Result<()> {
        self.submit(Command::Scan(params))
    }

    /// Join the network in the stored station config.
    pub fn connect(&self) -> Result<()> {
        self.submit(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.submit(Command::Disconnect)
    }

    pub fn open_ap(&self) -> Result<()> {
        self.submit(Command::OpenAp)
    }

    pub fn close_ap(&self) -> Result<()> {
        self.submit(Command::CloseAp)
    }

    /// Start the SoftAP with the stored AP config.
    pub fn start_ap(&self) -> Result<()> {
        self.submit(Command::StartAp)
    }

    pub fn stop_ap(&self) -> Result<()> {
        self.submit(Command::StopAp)
    }

    pub fn del_station(&self, mac: MacAddr) -> Result<()> {
        self.submit(Command::DelStation(mac))
    }

    /// Tell the driver about a newly acquired address. Runs synchronously
    /// under the command lock.
    pub fn notify_ip(&self, addr: IpAddr) -> Result<()> {
        let _core = self.shared.core.lock();
        let result = match addr {
            IpAddr::V4(v4) => self.shared.driver.notify_ip(&v4.octets()),
            IpAddr::V6(v6) => self.shared.driver.notify_ip(&v6.octets()),
        };
        match &result {
            Ok(()) => tracing::info!(addr = %addr, "IP address forwarded to driver"),
            Err(e) => tracing::warn!(addr = %addr, error = %e, "failed to forward IP address"),
        }
        result
    }

    pub fn sta_state(&self) -> StaState {
        self.shared.core.lock().sta.state()
    }

    pub fn ap_state(&self) -> ApState {
        self.shared.core.lock().ap.state()
    }

    /// Commands currently registered, in slot order.
    pub fn registered_commands(&self) -> Vec<CommandId> {
        self.shared.core.lock().registry.registered()
    }

    pub fn is_registered(&self, id: CommandId) -> bool {
        self.shared.core.lock().registry.is_registered(id)
    }

    /// Whether a station operation timer is pending.
    pub fn sta_timer_armed(&self) -> bool {
        self.shared.core.lock().sta.timer_armed()
    }

    /// The event dispatcher, for application-side subscriptions.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.shared.dispatcher
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub async fn is_running(&self) -> bool {
        self.processor.lock().await.is_running()
    }

    /// Stop the worker, discard queued commands, cancel timers and drop all
    /// subscriptions and registrations. Later submissions fail with
    /// [`WifiMgrError::Stopped`](crate::WifiMgrError::Stopped).
    pub async fn shutdown(&self) {
        self.processor.lock().await.stop().await;

        {
            let mut core = self.shared.core.lock();
            core.sta.cancel_timer();
            core.registry.clear();
        }
        self.shared.dispatcher.clear();

        let event_loop = self.event_loop.lock().take();
        if let Some(handle) = event_loop {
            handle.abort();
        }
        tracing::info!("wifi manager stopped");
    }
}

impl Drop for WifiManager {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
    }
}
