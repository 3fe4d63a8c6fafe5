//! Per-role state machines.
//!
//! Each machine answers two questions about a command: may it run now
//! ([`StaMachine::query`]) and where does a successful run leave the role
//! ([`StaMachine::step`]). Both are answered from the current state alone.
//! Event subscribers move a machine outside of `step` through
//! [`StaMachine::force`], which always lands in a settled state and disarms
//! the operation timer.
//!
//! Which of the allowed commands are currently reachable is decided by the
//! sender registry, not here.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandId;
use crate::config::ManagerConfig;
use crate::error::WifiMgrError;
use crate::events::{EventSink, WifiEvent};
use crate::timer::OpTimer;
use crate::types::Role;

/// Answer of a legality query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Legality {
    /// The command may run.
    Allow,
    /// An operation is in progress; retry later.
    Busy,
    /// No state of this role accepts the command.
    Unsupported,
}

/// Station role states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaState {
    #[default]
    Unavailable,
    Ready,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
}

impl StaState {
    pub fn name(self) -> &'static str {
        match self {
            StaState::Unavailable => "unavailable",
            StaState::Ready => "ready",
            StaState::Scanning => "scanning",
            StaState::Connecting => "connecting",
            StaState::Connected => "connected",
            StaState::Disconnecting => "disconnecting",
        }
    }

    /// States waiting on a driver completion.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            StaState::Scanning | StaState::Connecting | StaState::Disconnecting
        )
    }
}

impl fmt::Display for StaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access point role states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApState {
    #[default]
    Unavailable,
    Ready,
    Started,
}

impl ApState {
    pub fn name(self) -> &'static str {
        match self {
            ApState::Unavailable => "unavailable",
            ApState::Ready => "ready",
            ApState::Started => "started",
        }
    }
}

impl fmt::Display for ApState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timer armed after a successful command: label, duration and the synthetic
/// failure event posted on expiry.
pub type TimeoutSpec = (&'static str, Duration, WifiEvent);

/// Station state machine.
#[derive(Debug, Default)]
pub struct StaMachine {
    state: StaState,
    /// State a running scan returns to.
    scan_return: StaState,
    timer: OpTimer,
}

impl StaMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StaState {
        self.state
    }

    pub fn query(&self, id: CommandId) -> Legality {
        if id.role() != Role::Station {
            return Legality::Unsupported;
        }
        if id.is_common() {
            return Legality::Allow;
        }
        if self.state.is_transient() {
            Legality::Busy
        } else {
            Legality::Allow
        }
    }

    /// Advance after `id` ran successfully.
    pub fn step(&mut self, id: CommandId) {
        let next = match (self.state, id) {
            (_, CommandId::OpenSta) | (_, CommandId::CloseSta) => StaState::Ready,
            (from @ (StaState::Ready | StaState::Connected), CommandId::Scan) => {
                self.scan_return = from;
                StaState::Scanning
            }
            (StaState::Ready, CommandId::Connect) => StaState::Connecting,
            (StaState::Connected, CommandId::Disconnect) => StaState::Disconnecting,
            (state, _) => state,
        };
        self.transition(next);
    }

    /// Event-driven transition. Disarms the timer when the state changes.
    pub fn force(&mut self, next: StaState) {
        self.transition(next);
    }

    /// Leave `Scanning` for the state the scan started from.
    pub fn finish_scan(&mut self) -> StaState {
        if self.state == StaState::Scanning {
            self.transition(self.scan_return);
        }
        self.state
    }

    /// Record a link loss that happened while a scan was running, so the
    /// scan completes into `Ready` instead of `Connected`.
    pub fn link_lost_during_scan(&mut self) {
        if self.state == StaState::Scanning {
            self.scan_return = StaState::Ready;
        }
    }

    /// Timer to arm after `id` succeeded, if any.
    pub fn timeout_for(id: CommandId, config: &ManagerConfig) -> Option<TimeoutSpec> {
        let (label, after) = match id {
            CommandId::Scan => ("scan", config.scan_timeout()),
            CommandId::Connect => ("connect", config.connect_timeout()),
            CommandId::Disconnect => ("disconnect", config.disconnect_timeout()),
            _ => return None,
        };
        let failed = WifiMgrError::Timeout(label.to_string()).errno();
        let event = match id {
            CommandId::Scan => WifiEvent::ScanDone { result: failed },
            CommandId::Connect => WifiEvent::Connect { status: failed },
            _ => WifiEvent::Disconnect { reason: failed },
        };
        Some((label, after, event))
    }

    pub fn arm_timer(&mut self, spec: TimeoutSpec, sink: EventSink) {
        let (label, after, event) = spec;
        self.timer.arm(label, after, sink, event);
    }

    pub fn cancel_timer(&mut self) -> bool {
        self.timer.cancel()
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    fn transition(&mut self, next: StaState) {
        if next != self.state {
            self.timer.cancel();
            tracing::debug!(role = "sta", from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }
}

/// Access point state machine.
///
/// Starting and stopping the SoftAP complete synchronously in the driver, so
/// the machine has no in-progress states and never answers `Busy`.
#[derive(Debug, Default)]
pub struct ApMachine {
    state: ApState,
}

impl ApMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ApState {
        self.state
    }

    pub fn query(&self, id: CommandId) -> Legality {
        if id.role() != Role::AccessPoint {
            Legality::Unsupported
        } else {
            Legality::Allow
        }
    }

    pub fn step(&mut self, id: CommandId) {
        let next = match (self.state, id) {
            (_, CommandId::OpenAp) | (_, CommandId::CloseAp) => ApState::Ready,
            (ApState::Ready, CommandId::StartAp) => ApState::Started,
            (ApState::Started, CommandId::StopAp) => ApState::Ready,
            (state, _) => state,
        };
        self.force(next);
    }

    pub fn force(&mut self, next: ApState) {
        if next != self.state {
            tracing::debug!(role = "ap", from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }
}
