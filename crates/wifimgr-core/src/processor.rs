//! Command processor.
//!
//! A single worker task owns the receiving end of the command channel and
//! runs every command to completion before taking the next one, so handlers,
//! state transitions and registry changes never race with each other.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::ap;
use crate::command::Command;
use crate::context::{Core, Shared};
use crate::error::{Result, WifiMgrError};
use crate::notify::Notice;
use crate::state::{Legality, StaMachine};
use crate::sta;

/// Sending half of the command channel.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    /// Queue a command. Never waits; a full queue rejects the command.
    pub fn submit(&self, command: Command) -> Result<()> {
        let id = command.id();
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(command = %id, "command queue full, command rejected");
                WifiMgrError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => WifiMgrError::Stopped,
        })?;
        tracing::trace!(command = %id, "command queued");
        Ok(())
    }
}

/// The worker loop and its stop signal.
pub(crate) struct CommandProcessor {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CommandProcessor {
    /// Create the command channel and spawn the worker.
    pub fn start(shared: Arc<Shared>, depth: usize) -> (Self, CommandSender) {
        let (tx, rx) = mpsc::channel(depth);
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(shared, rx, stop_rx));
        (
            Self {
                stop,
                handle: Some(handle),
            },
            CommandSender { tx },
        )
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker after the command it is running, discarding anything
    /// still queued, and wait for it to exit.
    pub async fn stop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "command worker ended abnormally");
            }
        }
    }
}

impl Drop for CommandProcessor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(shared: Arc<Shared>, mut rx: mpsc::Receiver<Command>, mut stop: watch::Receiver<bool>) {
    tracing::debug!("command worker started");
    loop {
        let command = tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        execute(&shared, command);
    }

    rx.close();
    let mut discarded = 0usize;
    while let Ok(command) = rx.try_recv() {
        tracing::debug!(command = %command.id(), "queued command discarded");
        discarded += 1;
    }
    tracing::debug!(discarded, "command worker stopped");
}

/// Run one command and report the outcome. Failures leave state untouched.
///
/// Notifications are delivered after the command lock is released.
pub(crate) fn execute(shared: &Arc<Shared>, command: Command) {
    let id = command.id();
    let mut core = shared.core.lock();
    let outcome = process(shared, &mut core, command);
    let state = core.state_name(id.role());
    let mut notices = core.take_notices();
    drop(core);

    match outcome {
        Ok(()) => {
            tracing::debug!(command = %id, state, "command done");
        }
        Err(e) => {
            match &e {
                WifiMgrError::AlreadyInProgress(_) => {
                    tracing::info!(command = %id, state, "command dropped, retry later");
                }
                _ => {
                    tracing::warn!(command = %id, state, error = %e, "command dropped");
                }
            }
            notices.push(Notice::Dropped(id, e));
        }
    }
    shared.deliver(notices);
}

fn process(shared: &Arc<Shared>, core: &mut Core, command: Command) -> Result<()> {
    let id = command.id();
    let role = id.role();

    match core.query(id) {
        Legality::Allow => {}
        Legality::Busy => return Err(WifiMgrError::AlreadyInProgress(id.name().to_string())),
        Legality::Unsupported => {
            return Err(WifiMgrError::not_supported(format!(
                "{id} in {role} role"
            )))
        }
    }

    if !id.is_common() && !core.brought_up(role) {
        let iface = shared.config.iface_name(role);
        shared.driver.bring_up(role, iface)?;
        core.mark_brought_up(role);
        tracing::info!(role = %role, iface, "role brought up");
    }

    if !core.registry.is_registered(id) {
        return Err(WifiMgrError::NotPermitted {
            command: id.name().to_string(),
            state: core.state_name(role).to_string(),
        });
    }

    dispatch(shared, core, command)?;

    core.step(id);
    if let Some(timeout) = StaMachine::timeout_for(id, &shared.config) {
        core.sta.arm_timer(timeout, shared.sink.clone());
    }
    Ok(())
}

fn dispatch(shared: &Arc<Shared>, core: &mut Core, command: Command) -> Result<()> {
    match command {
        Command::SetStaConfig(config) => sta::set_config(core, config),
        Command::GetStaConfig => sta::get_config(core),
        Command::GetStaStatus => sta::get_status(shared, core),
        Command::OpenSta => sta::open(shared, core),
        Command::CloseSta => sta::close(shared, core),
        Command::Scan(params) => sta::scan(shared, params),
        Command::Connect => sta::connect(shared, core),
        Command::Disconnect => sta::disconnect(shared),
        Command::SetApConfig(config) => ap::set_config(core, config),
        Command::GetApConfig => ap::get_config(shared, core),
        Command::GetApStatus => ap::get_status(shared, core),
        Command::OpenAp => ap::open(shared, core),
        Command::CloseAp => ap::close(shared, core),
        Command::StartAp => ap::start(shared, core),
        Command::StopAp => ap::stop(shared, core),
        Command::DelStation(mac) => ap::del_station(shared, core, mac),
    }
}
