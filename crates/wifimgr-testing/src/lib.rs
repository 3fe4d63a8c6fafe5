//! Testing utilities for wifimgr
//!
//! This crate provides:
//! - A simulated network-chip driver with scripted completions and event
//!   injection
//! - Recording callbacks capturing every manager notification
//! - A harness wiring both to a manager

pub mod callbacks;
pub mod driver;
pub mod harness;

pub use callbacks::{Notification, RecordingCallbacks};
pub use driver::{Completion, SimulatedDriver};
pub use harness::{Harness, WAIT};
