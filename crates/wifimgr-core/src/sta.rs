//! Station control logic.
//!
//! Command handlers run on the worker with the core lock held. Completion of
//! the asynchronous operations (scan, connect, link loss) happens in event
//! subscribers, which take the same lock before touching state.

use std::sync::{Arc, Weak};

use crate::command::CommandId;
use crate::config::WifiConfig;
use crate::context::{Core, Shared, STA_OWNER};
use crate::error::{Result, WifiMgrError};
use crate::events::{EventKind, WifiEvent};
use crate::notify::{Notice, StaStatus, StatusReport};
use crate::state::StaState;
use crate::types::{Role, ScanParams};

/// Commands reachable while the station is open and not connected.
const OPENED: [CommandId; 3] = [CommandId::CloseSta, CommandId::Scan, CommandId::Connect];

pub(crate) fn set_config(core: &mut Core, config: WifiConfig) -> Result<()> {
    config.validate()?;
    tracing::info!(ssid = %config.ssid, channel = config.channel, "station config updated");
    core.sta_ctx.config = config;
    Ok(())
}

pub(crate) fn get_config(core: &mut Core) -> Result<()> {
    let config = core.sta_ctx.config.clone();
    core.notify(Notice::Config(Role::Station, config));
    Ok(())
}

pub(crate) fn get_status(shared: &Shared, core: &mut Core) -> Result<()> {
    let own_mac = shared.own_mac(core, Role::Station);
    let state = core.sta.state();
    let (host_bssid, rssi) = if state == StaState::Connected {
        let rssi = shared
            .driver
            .get_station()
            .inspect_err(|e| tracing::debug!(error = %e, "signal strength unavailable"))
            .ok();
        (core.sta_ctx.host_bssid, rssi)
    } else {
        (None, None)
    };
    core.notify(Notice::Status(StatusReport::Station(StaStatus {
        state,
        own_mac,
        host_bssid,
        rssi,
    })));
    Ok(())
}

pub(crate) fn open(shared: &Shared, core: &mut Core) -> Result<()> {
    shared.driver.open(Role::Station)?;
    core.registry.unregister(CommandId::OpenSta);
    core.registry.register_all(&OPENED);
    tracing::info!("station opened");
    Ok(())
}

pub(crate) fn close(shared: &Shared, core: &mut Core) -> Result<()> {
    shared.driver.close(Role::Station)?;
    core.registry.unregister_all(&OPENED);
    core.registry.unregister(CommandId::Disconnect);
    core.registry.register(CommandId::OpenSta);
    shared.drop_subscriptions(STA_OWNER);
    core.sta.cancel_timer();
    core.sta_ctx.host_bssid = None;
    tracing::info!("station closed");
    Ok(())
}

pub(crate) fn scan(shared: &Arc<Shared>, params: ScanParams) -> Result<()> {
    let forward = Arc::downgrade(shared);
    shared
        .dispatcher
        .subscribe(EventKind::ScanResult, STA_OWNER, move |event| {
            if let (Some(shared), WifiEvent::ScanResult(entry)) = (forward.upgrade(), event) {
                shared.callbacks.scan_result(entry);
            }
            Ok(())
        })?;

    let complete = Arc::downgrade(shared);
    let subscribed = shared
        .dispatcher
        .subscribe_once(EventKind::ScanDone, STA_OWNER, move |event| {
            with_core(&complete, |shared, core| match event {
                WifiEvent::ScanDone { result } => on_scan_done(shared, core, *result),
                _ => Ok(()),
            })
        });
    if let Err(e) = subscribed {
        let _ = shared.dispatcher.unsubscribe(EventKind::ScanResult, STA_OWNER);
        return Err(e);
    }

    if let Err(e) = shared.driver.scan(&params) {
        let _ = shared.dispatcher.unsubscribe(EventKind::ScanResult, STA_OWNER);
        let _ = shared.dispatcher.unsubscribe(EventKind::ScanDone, STA_OWNER);
        return Err(e);
    }
    tracing::info!(band = ?params.band, channel = params.channel, "scan started");
    Ok(())
}

pub(crate) fn connect(shared: &Arc<Shared>, core: &mut Core) -> Result<()> {
    if !core.sta_ctx.config.has_ssid() {
        return Err(WifiMgrError::invalid("no SSID configured"));
    }

    let complete = Arc::downgrade(shared);
    shared
        .dispatcher
        .subscribe_once(EventKind::Connect, STA_OWNER, move |event| {
            with_core(&complete, |shared, core| match event {
                WifiEvent::Connect { status } => on_connect(shared, core, *status),
                _ => Ok(()),
            })
        })?;

    if let Err(e) = shared.driver.connect(&core.sta_ctx.config) {
        let _ = shared.dispatcher.unsubscribe(EventKind::Connect, STA_OWNER);
        return Err(e);
    }
    tracing::info!(ssid = %core.sta_ctx.config.ssid, "connecting");
    Ok(())
}

pub(crate) fn disconnect(shared: &Shared) -> Result<()> {
    shared.driver.disconnect()?;
    tracing::info!("disconnecting");
    Ok(())
}

/// Run `f` on the live manager with the core lock held, then deliver the
/// notifications it queued. Does nothing once the manager is gone.
pub(crate) fn with_core<F>(shared: &Weak<Shared>, f: F) -> Result<()>
where
    F: FnOnce(&Arc<Shared>, &mut Core) -> Result<()>,
{
    let Some(shared) = shared.upgrade() else {
        return Ok(());
    };
    let mut core = shared.core.lock();
    let outcome = f(&shared, &mut core);
    let notices = core.take_notices();
    drop(core);
    shared.deliver(notices);
    outcome
}

fn on_scan_done(shared: &Shared, core: &mut Core, result: i32) -> Result<()> {
    let _ = shared.dispatcher.unsubscribe(EventKind::ScanResult, STA_OWNER);
    let state = core.sta.finish_scan();
    tracing::info!(result, state = %state, "scan done");
    core.notify(Notice::ScanDone(result));
    Ok(())
}

fn on_connect(shared: &Arc<Shared>, core: &mut Core, status: i32) -> Result<()> {
    if core.sta.state() != StaState::Connecting {
        tracing::debug!(status, state = %core.sta.state(), "stale connect event ignored");
        return Ok(());
    }

    if status == 0 {
        core.sta.force(StaState::Connected);
        let bssid = core.sta_ctx.config.bssid;
        core.sta_ctx.host_bssid = (!bssid.is_zero()).then_some(bssid);
        core.registry.unregister(CommandId::Connect);
        core.registry.register(CommandId::Disconnect);

        let link = Arc::downgrade(shared);
        let subscribed = shared
            .dispatcher
            .subscribe(EventKind::Disconnect, STA_OWNER, move |event| {
                with_core(&link, |shared, core| match event {
                    WifiEvent::Disconnect { reason } => on_disconnect(shared, core, *reason),
                    _ => Ok(()),
                })
            });
        if let Err(e) = subscribed {
            tracing::warn!(error = %e, "link-loss subscription already present");
        }
        tracing::info!(ssid = %core.sta_ctx.config.ssid, "connected");
    } else {
        core.sta.force(StaState::Ready);
        tracing::warn!(status, ssid = %core.sta_ctx.config.ssid, "connect failed");
    }
    core.notify(Notice::Connect(status));
    Ok(())
}

fn on_disconnect(shared: &Shared, core: &mut Core, reason: i32) -> Result<()> {
    match core.sta.state() {
        StaState::Connected | StaState::Disconnecting => core.sta.force(StaState::Ready),
        StaState::Scanning => core.sta.link_lost_during_scan(),
        state => {
            tracing::debug!(reason, state = %state, "stale disconnect event ignored");
            return Ok(());
        }
    }

    core.registry.unregister(CommandId::Disconnect);
    core.registry.register(CommandId::Connect);
    core.sta_ctx.host_bssid = None;
    let _ = shared.dispatcher.unsubscribe(EventKind::Disconnect, STA_OWNER);
    tracing::info!(reason, "disconnected");
    core.notify(Notice::Disconnect(reason));
    Ok(())
}
