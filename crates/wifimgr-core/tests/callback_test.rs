//! Callbacks that call back into the manager.

use std::net::IpAddr;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use wifimgr_core::{
    CommandId, ControlCallbacks, ManagerConfig, StaState, WifiConfig, WifiManager, WifiMgrError,
};
use wifimgr_testing::{SimulatedDriver, WAIT};

#[derive(Default)]
struct Reentrant {
    manager: OnceLock<Weak<WifiManager>>,
    on_connect: Mutex<Vec<(StaState, bool)>>,
    on_dropped: Mutex<Vec<(CommandId, Vec<CommandId>)>>,
}

impl Reentrant {
    fn manager(&self) -> Option<Arc<WifiManager>> {
        self.manager.get().and_then(Weak::upgrade)
    }
}

impl ControlCallbacks for Reentrant {
    fn connect(&self, _status: i32) {
        if let Some(manager) = self.manager() {
            let addr: IpAddr = "192.168.1.20".parse().unwrap();
            let forwarded = manager.notify_ip(addr).is_ok();
            self.on_connect.lock().push((manager.sta_state(), forwarded));
        }
    }

    fn command_dropped(&self, id: CommandId, _error: &WifiMgrError) {
        if let Some(manager) = self.manager() {
            self.on_dropped.lock().push((id, manager.registered_commands()));
        }
    }
}

async fn wait_for(pred: impl Fn() -> bool) -> bool {
    let poll = async {
        while !pred() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(WAIT, poll).await.is_ok()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_callbacks_may_query_the_manager() {
    let driver = Arc::new(SimulatedDriver::new());
    let callbacks = Arc::new(Reentrant::default());
    let manager = Arc::new(
        WifiManager::new(driver.clone(), callbacks.clone(), ManagerConfig::default()).unwrap(),
    );
    callbacks.manager.set(Arc::downgrade(&manager)).unwrap();

    manager.set_sta_config(WifiConfig::new("home")).unwrap();
    manager.open_sta().unwrap();
    manager.connect().unwrap();
    assert!(wait_for(|| !callbacks.on_connect.lock().is_empty()).await);
    assert_eq!(
        callbacks.on_connect.lock().as_slice(),
        [(StaState::Connected, true)]
    );
    assert_eq!(driver.call_count("notify_ip"), 1);

    // The dropped-command path runs on the worker.
    manager.start_ap().unwrap();
    assert!(wait_for(|| !callbacks.on_dropped.lock().is_empty()).await);
    let dropped = callbacks.on_dropped.lock().clone();
    assert_eq!(dropped[0].0, CommandId::StartAp);
    assert!(dropped[0].1.contains(&CommandId::Disconnect));

    // The worker is still serving commands.
    manager.disconnect().unwrap();
    assert!(wait_for(|| manager.sta_state() == StaState::Ready).await);
    manager.shutdown().await;
}
