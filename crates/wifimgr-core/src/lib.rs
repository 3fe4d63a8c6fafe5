//! Control-plane core of a WiFi connection manager.
//!
//! Provides:
//! - An asynchronous command channel drained by a single worker
//! - Station and access point state machines gating every command
//! - A command sender registry that follows role state
//! - An event dispatcher fanning driver events out to subscribers
//! - A driver interface adapter over a network-chip driver
//! - Station and access point control logic

pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod manager;
pub mod notify;
pub mod processor;
pub mod registry;
pub mod state;
pub mod timer;
pub mod types;

mod ap;
mod context;
mod sta;

// Re-exports
pub use command::{Command, CommandId};

pub use config::{ManagerConfig, WifiConfig};

pub use driver::{
    ApCallback, DriverCapabilities, DriverInterface, DriverResult, LinkCallback, ScanCallback,
    WifiDriver,
};

pub use error::{DriverError, Result, WifiMgrError};

pub use events::{EventDispatcher, EventKind, EventReceiver, EventSink, WifiEvent};

pub use manager::WifiManager;

pub use notify::{ApStatus, ControlCallbacks, NoopCallbacks, StaStatus, StatusReport};

pub use processor::CommandSender;

pub use registry::CommandRegistry;

pub use state::{ApState, Legality, StaState};

pub use types::{Band, MacAddr, Role, ScanEntry, ScanParams};
