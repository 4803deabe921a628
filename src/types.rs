use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

use crate::{
    error::{DeskError, Result},
    protocol::{DOWN_COMMAND, UP_COMMAND},
    MAX_DESK_HEIGHT, MIN_DESK_HEIGHT,
};

/// Direction of desk travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Raise the desk
    Up,
    /// Lower the desk
    Down,
}

impl Direction {
    /// Pick the direction that brings `current` towards `target`
    ///
    /// Returns `None` when the desk is already at the target.
    #[must_use]
    pub fn for_move(current: u8, target: u8) -> Option<Self> {
        match target.cmp(&current) {
            std::cmp::Ordering::Greater => Some(Self::Up),
            std::cmp::Ordering::Less => Some(Self::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// 40-bit firmware command constant for this direction
    #[must_use]
    pub const fn command_constant(self) -> u64 {
        match self {
            Self::Up => UP_COMMAND,
            Self::Down => DOWN_COMMAND,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Height and speed reported together by one telemetry frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskReading {
    /// Height in centimeters
    pub height: u8,
    /// Speed in the unit reported by the desk
    pub speed: u8,
}

impl DeskReading {
    /// Create a new reading
    #[must_use]
    pub const fn new(height: u8, speed: u8) -> Self {
        Self { height, speed }
    }
}

/// Device seen during a BLE scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Device address as printed by the platform
    pub address: String,
    /// Advertised local name
    pub local_name: Option<String>,
    /// Signal strength (RSSI)
    pub rssi: Option<i16>,
}

impl ScanResult {
    /// Create a scan result with only an address
    #[must_use]
    pub const fn new(address: String) -> Self {
        Self {
            address,
            local_name: None,
            rssi: None,
        }
    }

    /// Whether this result belongs to the device at `address`
    ///
    /// Hex digits are compared without regard to case.
    #[must_use]
    pub fn matches_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

/// Connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// How long to wait for the desk to show up in scan results
    pub scan_timeout_ms: u64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Wait after the priming stop command, in milliseconds
    pub settle_ms: u64,
    /// Fail the connection if no telemetry arrived while settling
    pub verify_telemetry: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 30_000,
            connect_timeout_ms: 30_000,
            settle_ms: 1_000,
            verify_telemetry: true,
        }
    }
}

/// Closed-loop motion tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Acceptance band around the target height, in centimeters
    ///
    /// The desk keeps moving after the last command and telemetry lags the
    /// physical position, so the move stops this far short of the target.
    pub tolerance: u8,
    /// Delay before each repeated move command, in milliseconds
    pub command_interval_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            tolerance: 5,
            command_interval_ms: 200,
        }
    }
}

impl MotionConfig {
    /// Delay before each repeated move command
    #[must_use]
    pub const fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }
}

/// Check that a height is within the physical range of the desk
///
/// # Errors
///
/// Returns [`DeskError::InvalidHeight`] when `height` is outside 65-130 cm.
pub fn validate_height(height: u8) -> Result<u8> {
    if !(MIN_DESK_HEIGHT..=MAX_DESK_HEIGHT).contains(&height) {
        return Err(DeskError::InvalidHeight { height });
    }
    Ok(height)
}

/// One stop of a sit/stand schedule: a height and how long to hold it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Target height in centimeters
    pub height: u8,
    /// How long to stay at this height
    pub hold: Duration,
}

impl FromStr for Position {
    type Err = DeskError;

    /// Parse `<centimeters>:<minutes>`, e.g. `110:45`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DeskError::InvalidPosition(s.to_string());

        let (height, minutes) = s.split_once(':').ok_or_else(invalid)?;
        if height.is_empty()
            || minutes.is_empty()
            || !height.bytes().all(|b| b.is_ascii_digit())
            || !minutes.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let height: u8 = height.parse().map_err(|_| invalid())?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        let seconds = minutes.checked_mul(60).ok_or_else(invalid)?;

        Ok(Self {
            height: validate_height(height)?,
            hold: Duration::from_secs(seconds),
        })
    }
}

/// Message shown to the user before the desk starts moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prompt {
    /// The desk is about to rise
    StandUp,
    /// The desk is about to lower
    Sit,
}

impl Prompt {
    /// Prompt for a move from `current` to `target`
    #[must_use]
    pub const fn for_move(target: u8, current: u8) -> Self {
        if target > current {
            Self::StandUp
        } else {
            Self::Sit
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StandUp => write!(f, "Time to STAND UP!"),
            Self::Sit => write!(f, "Time to SIT"),
        }
    }
}
