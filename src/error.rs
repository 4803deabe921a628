use thiserror::Error;

/// Errors that can occur when working with a TMotion desk
#[derive(Error, Debug)]
pub enum DeskError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No usable Bluetooth adapter on this host
    #[error("Could not enable BLE stack: no Bluetooth adapter available")]
    AdapterUnavailable,

    /// Scan could not be started or ended early
    #[error("Could not initiate bluetooth scan: {0}")]
    ScanFailed(String),

    /// The configured address never showed up in scan results
    #[error("Desk {address} not found")]
    DeskNotFound {
        /// Address that was searched for
        address: String,
    },

    /// Device connection failed
    #[error("Could not connect to the desk: {0}")]
    ConnectionFailed(String),

    /// The desk does not expose the UART service
    #[error("Could not find UART service")]
    ServiceNotFound,

    /// RX/TX characteristic discovery failed
    #[error("Could not get device characteristics: {0}")]
    CharacteristicNotFound(String),

    /// Writing a command to the desk failed; the desk state is unknown
    #[error("Cannot write data: {0}")]
    CommandWrite(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// No telemetry frame arrived while priming the session
    #[error("Desk did not report its height after priming")]
    TelemetryUnavailable,

    /// The session has not been connected yet
    #[error("Desk session is not connected")]
    NotConnected,

    /// Height outside the physical range of the desk
    #[error(
        "Height {height} cm is out of range ({min} - {max})",
        min = crate::MIN_DESK_HEIGHT,
        max = crate::MAX_DESK_HEIGHT
    )]
    InvalidHeight {
        /// Requested height
        height: u8,
    },

    /// Malformed `<centimeters>:<minutes>` position
    #[error("Incorrect format for position: {0}")]
    InvalidPosition(String),

    /// Device disconnected unexpectedly
    #[error("Device disconnected")]
    Disconnected,

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for desk operations
pub type Result<T> = std::result::Result<T, DeskError>;

impl DeskError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::AdapterUnavailable
                | Self::ScanFailed(_)
                | Self::DeskNotFound { .. }
                | Self::ConnectionFailed(_)
                | Self::ServiceNotFound
                | Self::CharacteristicNotFound(_)
                | Self::Disconnected
        )
    }

    /// Check if this error leaves the desk in an unknown control state
    ///
    /// A failed write in the middle of a move means the desk may still be
    /// travelling. Callers should not keep issuing moves after one of these.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::CommandWrite(_) | Self::Disconnected)
    }

    /// Check if this error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::TelemetryUnavailable
                | Self::InvalidHeight { .. }
                | Self::InvalidPosition(_)
        )
    }
}
