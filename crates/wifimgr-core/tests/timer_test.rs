//! Operation timeouts, run on paused time.

use std::time::Duration;

use wifimgr_core::{CommandId, ManagerConfig, ScanParams, StaState, WifiConfig};
use wifimgr_testing::{Completion, Harness, Notification, SimulatedDriver};

fn short_timeouts() -> ManagerConfig {
    ManagerConfig {
        scan_timeout_ms: 1_000,
        connect_timeout_ms: 2_000,
        disconnect_timeout_ms: 500,
        ..ManagerConfig::default()
    }
}

async fn opened() -> Harness {
    let h = Harness::with_config(
        SimulatedDriver::new().with_completion(Completion::Manual),
        short_timeouts(),
    )
    .unwrap();
    h.manager
        .set_sta_config(WifiConfig::new("home").with_passphrase("correct-horse"))
        .unwrap();
    h.manager.open_sta().unwrap();
    assert!(h.flush().await);
    h
}

#[tokio::test(start_paused = true)]
async fn test_scan_timeout() {
    let h = opened().await;
    h.manager.scan(ScanParams::default()).unwrap();
    assert!(h.flush().await);
    assert_eq!(h.manager.sta_state(), StaState::Scanning);
    assert!(h.manager.sta_timer_armed());

    tokio::time::advance(Duration::from_millis(1_100)).await;
    assert!(h.expect(1, |n| matches!(n, Notification::ScanDone(-110))).await);
    assert_eq!(h.manager.sta_state(), StaState::Ready);
    assert!(!h.manager.sta_timer_armed());
    assert!(h.manager.is_registered(CommandId::Scan));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_ignores_late_completion() {
    let h = opened().await;
    h.manager.connect().unwrap();
    assert!(h.flush().await);
    assert_eq!(h.manager.sta_state(), StaState::Connecting);

    tokio::time::advance(Duration::from_millis(2_100)).await;
    assert!(h.expect(1, |n| matches!(n, Notification::Connect(-110))).await);
    assert_eq!(h.manager.sta_state(), StaState::Ready);
    assert!(h.manager.is_registered(CommandId::Connect));

    // The driver finally answers; nobody is listening any more.
    assert!(h.driver.complete_connect(0));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.manager.sta_state(), StaState::Ready);
    assert_eq!(
        h.callbacks.count(|n| matches!(n, Notification::Connect(_))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_completion_before_timeout_disarms() {
    let h = opened().await;
    h.manager.scan(ScanParams::default()).unwrap();
    assert!(h.flush().await);

    assert!(h.driver.complete_scan(0));
    assert!(h.expect(1, |n| matches!(n, Notification::ScanDone(0))).await);
    assert!(!h.manager.sta_timer_armed());

    tokio::time::advance(Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        h.callbacks.count(|n| matches!(n, Notification::ScanDone(_))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_timeout_forces_ready() {
    let h = opened().await;
    h.manager.connect().unwrap();
    assert!(h.flush().await);
    assert!(h.driver.complete_connect(0));
    assert!(h.expect(1, |n| matches!(n, Notification::Connect(0))).await);

    // In manual mode the driver never confirms the disconnect.
    h.manager.disconnect().unwrap();
    assert!(h.flush().await);
    assert_eq!(h.manager.sta_state(), StaState::Disconnecting);
    assert!(h.manager.sta_timer_armed());

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(h.expect(1, |n| matches!(n, Notification::Disconnect(-110))).await);
    assert_eq!(h.manager.sta_state(), StaState::Ready);
    assert!(!h.manager.sta_timer_armed());
    assert!(h.manager.is_registered(CommandId::Connect));
    assert!(!h.manager.is_registered(CommandId::Disconnect));
}
