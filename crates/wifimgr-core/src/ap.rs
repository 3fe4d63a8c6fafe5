//! Access point control logic.

use std::sync::Arc;

use crate::command::CommandId;
use crate::config::WifiConfig;
use crate::context::{Core, Shared, AP_OWNER};
use crate::error::{Result, WifiMgrError};
use crate::events::{EventKind, WifiEvent};
use crate::notify::{ApStatus, Notice, StatusReport};
use crate::sta::with_core;
use crate::state::ApState;
use crate::types::{MacAddr, Role};

/// Commands reachable while the SoftAP runs.
const STARTED: [CommandId; 2] = [CommandId::StopAp, CommandId::DelStation];

pub(crate) fn set_config(core: &mut Core, config: WifiConfig) -> Result<()> {
    config.validate()?;
    tracing::info!(ssid = %config.ssid, channel = config.channel, "AP config updated");
    core.ap_ctx.config = config;
    Ok(())
}

/// Reports the stored config. An unset BSSID is reported as the AP's own MAC.
pub(crate) fn get_config(shared: &Shared, core: &mut Core) -> Result<()> {
    let mut config = core.ap_ctx.config.clone();
    if config.bssid.is_zero() {
        if let Some(mac) = shared.own_mac(core, Role::AccessPoint) {
            config.bssid = mac;
        }
    }
    core.notify(Notice::Config(Role::AccessPoint, config));
    Ok(())
}

pub(crate) fn get_status(shared: &Shared, core: &mut Core) -> Result<()> {
    let own_mac = shared.own_mac(core, Role::AccessPoint);
    let status = StatusReport::AccessPoint(ApStatus {
        state: core.ap.state(),
        own_mac,
        stations: core.ap_ctx.stations.iter().copied().collect(),
    });
    core.notify(Notice::Status(status));
    Ok(())
}

pub(crate) fn open(shared: &Shared, core: &mut Core) -> Result<()> {
    shared.driver.open(Role::AccessPoint)?;
    core.registry.unregister(CommandId::OpenAp);
    core.registry.register_all(&[CommandId::CloseAp, CommandId::StartAp]);
    tracing::info!("AP opened");
    Ok(())
}

pub(crate) fn close(shared: &Shared, core: &mut Core) -> Result<()> {
    shared.driver.close(Role::AccessPoint)?;
    core.registry.unregister_all(&STARTED);
    core.registry
        .unregister_all(&[CommandId::CloseAp, CommandId::StartAp]);
    core.registry.register(CommandId::OpenAp);
    shared.drop_subscriptions(AP_OWNER);
    core.ap_ctx.stations.clear();
    tracing::info!("AP closed");
    Ok(())
}

pub(crate) fn start(shared: &Arc<Shared>, core: &mut Core) -> Result<()> {
    if !core.ap_ctx.config.has_ssid() {
        return Err(WifiMgrError::invalid("no AP SSID configured"));
    }

    let joins = Arc::downgrade(shared);
    shared
        .dispatcher
        .subscribe(EventKind::NewStation, AP_OWNER, move |event| {
            with_core(&joins, |_, core| match event {
                WifiEvent::NewStation { connected, mac } => on_new_station(core, *connected, *mac),
                _ => Ok(()),
            })
        })?;
    let failures = Arc::downgrade(shared);
    let subscribed = shared
        .dispatcher
        .subscribe(EventKind::ApFailure, AP_OWNER, move |event| {
            with_core(&failures, |shared, core| match event {
                WifiEvent::ApFailure { reason } => on_failure(shared, core, *reason),
                _ => Ok(()),
            })
        });

    if let Err(e) = subscribed.and_then(|()| shared.driver.start_ap(&core.ap_ctx.config)) {
        shared.drop_subscriptions(AP_OWNER);
        return Err(e);
    }

    core.registry.unregister(CommandId::StartAp);
    core.registry.register_all(&STARTED);
    tracing::info!(ssid = %core.ap_ctx.config.ssid, "AP started");
    Ok(())
}

pub(crate) fn stop(shared: &Shared, core: &mut Core) -> Result<()> {
    shared.driver.stop_ap()?;
    stopped(shared, core);
    tracing::info!("AP stopped");
    Ok(())
}

pub(crate) fn del_station(shared: &Shared, core: &mut Core, mac: MacAddr) -> Result<()> {
    if mac.is_zero() || mac.is_broadcast() {
        return Err(WifiMgrError::invalid(format!("cannot remove station {mac}")));
    }
    shared.driver.del_station(&mac)?;
    core.ap_ctx.stations.remove(&mac);
    tracing::info!(mac = %mac, "station removed");
    Ok(())
}

/// Command surface and bookkeeping once the SoftAP is down.
fn stopped(shared: &Shared, core: &mut Core) {
    core.registry.unregister_all(&STARTED);
    core.registry.register(CommandId::StartAp);
    shared.drop_subscriptions(AP_OWNER);
    core.ap_ctx.stations.clear();
}

fn on_new_station(core: &mut Core, connected: bool, mac: MacAddr) -> Result<()> {
    if core.ap.state() != ApState::Started {
        tracing::debug!(mac = %mac, "station event while AP is down ignored");
        return Ok(());
    }
    if connected {
        core.ap_ctx.stations.insert(mac);
    } else {
        core.ap_ctx.stations.remove(&mac);
    }
    tracing::info!(mac = %mac, connected, stations = core.ap_ctx.stations.len(), "station changed");
    core.notify(Notice::NewStation { connected, mac });
    Ok(())
}

fn on_failure(shared: &Shared, core: &mut Core, reason: i32) -> Result<()> {
    if core.ap.state() != ApState::Started {
        return Ok(());
    }
    core.ap.force(ApState::Ready);
    stopped(shared, core);
    tracing::warn!(reason, "AP failed");
    core.notify(Notice::ApFailure(reason));
    Ok(())
}
