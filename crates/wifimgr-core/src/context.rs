//! Manager state shared by the worker, the event subscribers and the
//! submission front end.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::CommandId;
use crate::config::{ManagerConfig, WifiConfig};
use crate::driver::DriverInterface;
use crate::events::{EventDispatcher, EventSink, Owner};
use crate::notify::{ControlCallbacks, Notice};
use crate::registry::CommandRegistry;
use crate::state::{ApMachine, Legality, StaMachine};
use crate::types::{MacAddr, Role};

/// Subscription owner of the station control logic.
pub(crate) const STA_OWNER: Owner = "sta";
/// Subscription owner of the access point control logic.
pub(crate) const AP_OWNER: Owner = "ap";

#[derive(Debug, Default)]
pub(crate) struct StaContext {
    pub config: WifiConfig,
    pub own_mac: Option<MacAddr>,
    pub host_bssid: Option<MacAddr>,
    pub brought_up: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ApContext {
    pub config: WifiConfig,
    pub own_mac: Option<MacAddr>,
    pub stations: BTreeSet<MacAddr>,
    pub brought_up: bool,
}

/// Everything guarded by the command lock.
#[derive(Debug, Default)]
pub(crate) struct Core {
    pub sta: StaMachine,
    pub ap: ApMachine,
    pub registry: CommandRegistry,
    pub sta_ctx: StaContext,
    pub ap_ctx: ApContext,
    /// Notifications waiting for the lock to be released.
    outbox: Vec<Notice>,
}

impl Core {
    pub fn query(&self, id: CommandId) -> Legality {
        match id.role() {
            Role::Station => self.sta.query(id),
            Role::AccessPoint => self.ap.query(id),
        }
    }

    pub fn step(&mut self, id: CommandId) {
        match id.role() {
            Role::Station => self.sta.step(id),
            Role::AccessPoint => self.ap.step(id),
        }
    }

    pub fn state_name(&self, role: Role) -> &'static str {
        match role {
            Role::Station => self.sta.state().name(),
            Role::AccessPoint => self.ap.state().name(),
        }
    }

    pub fn brought_up(&self, role: Role) -> bool {
        match role {
            Role::Station => self.sta_ctx.brought_up,
            Role::AccessPoint => self.ap_ctx.brought_up,
        }
    }

    /// Queue a notification for delivery once the lock is released.
    pub fn notify(&mut self, notice: Notice) {
        self.outbox.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.outbox)
    }

    pub fn mark_brought_up(&mut self, role: Role) {
        match role {
            Role::Station => self.sta_ctx.brought_up = true,
            Role::AccessPoint => self.ap_ctx.brought_up = true,
        }
    }
}

pub(crate) struct Shared {
    pub core: Mutex<Core>,
    pub driver: DriverInterface,
    pub dispatcher: Arc<EventDispatcher>,
    pub callbacks: Arc<dyn ControlCallbacks>,
    pub config: ManagerConfig,
    /// Used by operation timers to post their expiry events.
    pub sink: EventSink,
}

impl Shared {
    /// Own MAC of `role`, fetched from the driver on first use.
    pub fn own_mac(&self, core: &mut Core, role: Role) -> Option<MacAddr> {
        let cached = match role {
            Role::Station => core.sta_ctx.own_mac,
            Role::AccessPoint => core.ap_ctx.own_mac,
        };
        if cached.is_some() {
            return cached;
        }
        match self.driver.get_mac(role) {
            Ok(mac) => {
                tracing::debug!(role = %role, mac = %mac, "own MAC fetched");
                match role {
                    Role::Station => core.sta_ctx.own_mac = Some(mac),
                    Role::AccessPoint => core.ap_ctx.own_mac = Some(mac),
                }
                Some(mac)
            }
            Err(e) => {
                tracing::warn!(role = %role, error = %e, "failed to read own MAC");
                None
            }
        }
    }

    /// Hand queued notifications to the application. Call without the core
    /// lock held.
    pub fn deliver(&self, notices: Vec<Notice>) {
        for notice in notices {
            notice.deliver(self.callbacks.as_ref());
        }
    }

    /// Remove every subscription of `owner`.
    pub fn drop_subscriptions(&self, owner: Owner) {
        self.dispatcher.unsubscribe_owner(owner);
    }
}
