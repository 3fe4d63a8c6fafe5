//! Error handling for the WiFi manager.
//!
//! Every failure inside the manager is one of the variants below. Command
//! submission is fire-and-forget, so most of these only ever reach the logs or
//! the [`ControlCallbacks::command_dropped`](crate::notify::ControlCallbacks::command_dropped)
//! notification; [`WifiMgrError::errno`] gives the OS-style code for callers
//! that want one.

/// OS-style error numbers surfaced to callers (negated by [`WifiMgrError::errno`]).
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const ENOTSUP: i32 = 95;
    pub const ESHUTDOWN: i32 = 108;
    pub const ETIMEDOUT: i32 = 110;
    pub const EALREADY: i32 = 114;
}

/// Failures reported by a network-chip driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The driver is already running an operation of this kind.
    #[error("driver busy")]
    Busy,

    /// Generic I/O failure talking to the chip.
    #[error("driver I/O failure")]
    Io,

    /// The driver advertised an operation it does not implement.
    #[error("operation not implemented by driver")]
    Unimplemented,

    /// Raw error number passed through from the driver.
    #[error("driver error {0}")]
    Errno(i32),
}

impl DriverError {
    /// Negative error number for this failure.
    pub fn errno(&self) -> i32 {
        match self {
            DriverError::Busy => -errno::EALREADY,
            DriverError::Io => -errno::EIO,
            DriverError::Unimplemented => -errno::ENOTSUP,
            DriverError::Errno(code) if *code > 0 => -code,
            DriverError::Errno(code) => *code,
        }
    }
}

/// Unified error type for the manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WifiMgrError {
    /// Malformed or missing input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation of the same kind is still outstanding.
    #[error("{0} already in progress, try again later")]
    AlreadyInProgress(String),

    /// The command is not legal in the current state.
    #[error("{command} not permitted in state {state}")]
    NotPermitted { command: String, state: String },

    /// The role or the driver lacks the requested capability.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Role bring-up has not completed or failed.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A subscription for this event kind and owner already exists.
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Nothing matched the removal request.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The command queue has no free slot.
    #[error("Command queue is full")]
    QueueFull,

    /// The manager has been torn down.
    #[error("Manager stopped")]
    Stopped,

    /// An armed operation timer expired.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The driver rejected the operation.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl WifiMgrError {
    /// Negative OS-style error number for this error.
    pub fn errno(&self) -> i32 {
        match self {
            WifiMgrError::InvalidArgument(_) => -errno::EINVAL,
            WifiMgrError::AlreadyInProgress(_) => -errno::EBUSY,
            WifiMgrError::NotPermitted { .. } => -errno::EPERM,
            WifiMgrError::NotSupported(_) => -errno::ENOTSUP,
            WifiMgrError::DeviceUnavailable(_) => -errno::ENODEV,
            WifiMgrError::AlreadyRegistered(_) => -errno::EEXIST,
            WifiMgrError::NotFound(_) => -errno::ENOENT,
            WifiMgrError::QueueFull => -errno::ENOSPC,
            WifiMgrError::Stopped => -errno::ESHUTDOWN,
            WifiMgrError::Timeout(_) => -errno::ETIMEDOUT,
            WifiMgrError::Config(_) => -errno::EINVAL,
            WifiMgrError::Driver(e) => e.errno(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        WifiMgrError::InvalidArgument(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        WifiMgrError::NotSupported(msg.into())
    }
}

/// Result type alias for manager operations.
pub type Result<T> = std::result::Result<T, WifiMgrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(WifiMgrError::invalid("ssid").errno(), -22);
        assert_eq!(WifiMgrError::AlreadyInProgress("scan".into()).errno(), -16);
        assert_eq!(
            WifiMgrError::NotPermitted {
                command: "connect".into(),
                state: "ready".into()
            }
            .errno(),
            -1
        );
        assert_eq!(WifiMgrError::not_supported("scan").errno(), -95);
        assert_eq!(WifiMgrError::DeviceUnavailable("sta".into()).errno(), -19);
        assert_eq!(WifiMgrError::AlreadyRegistered("x".into()).errno(), -17);
        assert_eq!(WifiMgrError::QueueFull.errno(), -28);
        assert_eq!(WifiMgrError::Stopped.errno(), -108);
        assert_eq!(WifiMgrError::Timeout("scan".into()).errno(), -110);
    }

    #[test]
    fn test_driver_errno_passthrough() {
        assert_eq!(DriverError::Errno(5).errno(), -5);
        assert_eq!(DriverError::Errno(-110).errno(), -110);
        assert_eq!(WifiMgrError::from(DriverError::Busy).errno(), -114);
    }

    #[test]
    fn test_error_display() {
        let err = WifiMgrError::NotPermitted {
            command: "scan".into(),
            state: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "scan not permitted in state unavailable");
        assert!(WifiMgrError::from(DriverError::Io)
            .to_string()
            .contains("driver I/O failure"));
    }
}
