//! Command processor tests.
//!
//! Ordering, gating, bring-up, queue limits and shutdown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use wifimgr_core::{
    Command, CommandId, DriverError, ManagerConfig, Role, StaState, StatusReport, WifiConfig,
    WifiMgrError,
};
use wifimgr_testing::{Harness, Notification, SimulatedDriver, WAIT};

#[tokio::test]
async fn test_unregistered_command_never_runs() {
    let h = Harness::new(SimulatedDriver::new()).unwrap();

    h.manager.disconnect().unwrap();
    h.manager.stop_ap().unwrap();
    assert!(h.flush().await);

    let dropped = h.callbacks.dropped();
    assert_eq!(dropped.len(), 2);
    assert_eq!(
        dropped[0],
        (
            CommandId::Disconnect,
            WifiMgrError::NotPermitted {
                command: "disconnect".into(),
                state: "unavailable".into(),
            }
        )
    );
    assert_eq!(dropped[1].1.errno(), -1);
    assert_eq!(h.driver.call_count("disconnect"), 0);
    assert_eq!(h.driver.call_count("stop_ap"), 0);
    assert_eq!(h.manager.sta_state(), StaState::Unavailable);
}

#[tokio::test]
async fn test_bring_up_failure() {
    let h = Harness::new(SimulatedDriver::new()).unwrap();
    h.driver.fail_bring_up(DriverError::Io);

    h.manager.open_sta().unwrap();
    assert!(h.flush().await);
    assert!(matches!(
        h.callbacks.dropped().as_slice(),
        [(CommandId::OpenSta, WifiMgrError::DeviceUnavailable(_))]
    ));
    assert_eq!(h.callbacks.dropped()[0].1.errno(), -19);
    assert!(h.callbacks.dropped()[0].1.to_string().contains("wlan0"));
    assert_eq!(h.driver.call_count("open"), 0);
    assert_eq!(h.manager.sta_state(), StaState::Unavailable);

    // Config and status commands never need the device.
    h.manager.set_sta_config(WifiConfig::new("home")).unwrap();
    assert!(h.flush().await);
    assert_eq!(h.callbacks.dropped().len(), 1);
    assert_eq!(h.driver.call_count("bring_up"), 1);

    // Bring-up is retried by the next role command.
    h.manager.open_sta().unwrap();
    assert!(h.flush().await);
    assert_eq!(h.driver.call_count("bring_up"), 2);
}

#[tokio::test]
async fn test_bring_up_once_per_role() {
    let h = Harness::new(SimulatedDriver::new()).unwrap();
    h.manager.open_sta().unwrap();
    h.manager.close_sta().unwrap();
    h.manager.open_sta().unwrap();
    h.manager.open_ap().unwrap();
    assert!(h.flush().await);

    assert_eq!(h.driver.call_count("bring_up"), 2);
    assert!(h.callbacks.dropped().is_empty());
}

#[tokio::test]
async fn test_commands_run_in_submission_order() {
    let h = Harness::new(SimulatedDriver::new()).unwrap();
    for i in 0..10 {
        h.manager
            .set_sta_config(WifiConfig::new(format!("net-{i}")))
            .unwrap();
    }
    assert!(h.flush().await);
    assert_eq!(
        h.callbacks.last_config(Role::Station).unwrap().ssid,
        "net-9"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_are_serialized() {
    let config = ManagerConfig {
        cmd_queue_depth: 64,
        ..ManagerConfig::default()
    };
    let h = Harness::with_config(
        SimulatedDriver::new().with_latency(Duration::from_millis(1)),
        config,
    )
    .unwrap();
    h.manager.set_sta_config(WifiConfig::new("home")).unwrap();
    h.manager.open_sta().unwrap();
    h.manager.connect().unwrap();
    assert!(h.expect(1, |n| matches!(n, Notification::Connect(0))).await);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let sender = h.manager.sender();
        tasks.push(tokio::spawn(async move {
            for _ in 0..8 {
                sender.submit(Command::GetStaStatus).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(
        h.callbacks
            .wait_for_count(WAIT, 32, |n| matches!(n, Notification::Status(_)))
            .await
    );
    assert_eq!(h.driver.max_concurrency(), 1);
    assert_eq!(h.driver.call_count("get_station"), 32);
    assert!(h
        .callbacks
        .notifications()
        .iter()
        .filter_map(|n| match n {
            Notification::Status(StatusReport::Station(s)) => Some(s.state),
            _ => None,
        })
        .all(|state| state == StaState::Connected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_config_writes_apply_in_arrival_order() {
    let config = ManagerConfig {
        cmd_queue_depth: 128,
        ..ManagerConfig::default()
    };
    let h = Harness::with_config(SimulatedDriver::new(), config).unwrap();

    // Submissions are recorded under one lock, so `arrived` is channel order.
    let arrived = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for task in 0..4 {
        let sender = h.manager.sender();
        let arrived = arrived.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..8 {
                let ssid = format!("net-{task}-{i}");
                {
                    let mut arrived = arrived.lock();
                    sender
                        .submit(Command::SetStaConfig(WifiConfig::new(ssid.clone())))
                        .unwrap();
                    sender.submit(Command::GetStaConfig).unwrap();
                    arrived.push(ssid);
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert!(h.flush().await);

    let arrived = arrived.lock().clone();
    assert_eq!(arrived.len(), 32);
    let reported: Vec<String> = h
        .callbacks
        .notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Config {
                role: Role::Station,
                config,
            } => Some(config.ssid),
            _ => None,
        })
        .take(arrived.len())
        .collect();
    assert_eq!(reported, arrived);
    assert_eq!(
        h.callbacks.last_config(Role::Station).unwrap().ssid,
        *arrived.last().unwrap()
    );
    assert!(h.callbacks.dropped().is_empty());
}

#[tokio::test]
async fn test_queue_full() {
    let config = ManagerConfig {
        cmd_queue_depth: 2,
        ..ManagerConfig::default()
    };
    let h = Harness::with_config(SimulatedDriver::new(), config).unwrap();

    // The worker cannot run before this task yields.
    h.manager.get_sta_status().unwrap();
    h.manager.get_ap_status().unwrap();
    let err = h.manager.get_sta_status().unwrap_err();
    assert_eq!(err, WifiMgrError::QueueFull);
    assert_eq!(err.errno(), -28);

    assert!(
        h.callbacks
            .wait_for_count(WAIT, 2, |n| matches!(n, Notification::Status(_)))
            .await
    );
}

#[tokio::test]
async fn test_shutdown() {
    let h = Harness::new(SimulatedDriver::new()).unwrap();
    h.manager.open_sta().unwrap();
    assert!(h.flush().await);
    assert!(h.manager.is_running().await);

    h.manager.shutdown().await;
    assert!(!h.manager.is_running().await);
    assert_eq!(h.manager.open_ap().unwrap_err(), WifiMgrError::Stopped);
    assert!(h.manager.registered_commands().is_empty());
    assert!(!h.manager.sta_timer_armed());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.driver.call_count("open"), 1);
}

#[tokio::test]
async fn test_shutdown_discards_queued_commands() {
    let h = Harness::new(SimulatedDriver::new()).unwrap();

    h.manager.open_sta().unwrap();
    h.manager.open_ap().unwrap();
    // Nothing has run yet: this task has not yielded.
    h.manager.shutdown().await;

    assert!(h.driver.calls().is_empty());
    assert_eq!(
        h.manager.submit(Command::GetApStatus).unwrap_err(),
        WifiMgrError::Stopped
    );
}

#[tokio::test]
async fn test_independent_managers() {
    let a = Harness::new(SimulatedDriver::new()).unwrap();
    let b = Harness::new(SimulatedDriver::new()).unwrap();

    a.manager.open_sta().unwrap();
    assert!(a.flush().await);
    assert!(b.flush().await);

    assert_eq!(a.manager.sta_state(), StaState::Ready);
    assert_eq!(b.manager.sta_state(), StaState::Unavailable);
    assert_eq!(b.driver.call_count("bring_up"), 0);
}
