#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # TMotion desk
//!
//! A Rust library for controlling TMotion motorized standing desks via
//! Bluetooth Low Energy.
//!
//! The desk controller exposes a Nordic UART Service. Commands go to the RX
//! characteristic and the desk streams height/speed telemetry back over TX
//! notifications. There is no "go to height" command in the firmware: the
//! desk only moves while move commands keep arriving, so this crate drives it
//! closed-loop, repeating the command until the reported height is within a
//! tolerance band of the target and then sending a stop.
//!
//! ## Protocol
//!
//! - **Up**: `D9 FF 01 63 3C`
//! - **Down**: `D9 FF 02 60 3A`
//! - **Stop**: `00 00 00 00 00` (also makes the desk report its height)
//! - **Telemetry**: byte 1 is speed, byte 3 is height in centimeters; frames
//!   shorter than 4 bytes are ignored
//!
//! ## Quick Start
//!
//! ```no_run
//! use tmotion_desk::DeskSession;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Scan for the desk and establish a session
//!     let mut desk = DeskSession::new("D4:36:39:8A:1F:02");
//!     desk.connect().await?;
//!
//!     // Stand up
//!     desk.move_to(110).await?;
//!
//!     Ok(())
//! }
//! ```

/// Bluetooth Low Energy transport built on btleplug
pub mod ble;
/// Desk session and connection sequence
pub mod device;
/// Error types and handling
pub mod error;
/// Closed-loop move-to-height controller
pub mod motion;
/// Command encoding and telemetry decoding
pub mod protocol;
/// Sit/stand position schedules
pub mod schedule;
/// Shared height/speed state
pub mod state;
/// Telemetry ingestion from notification frames
pub mod telemetry;
pub mod transport;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use ble::{BleLink, BleTransport};
pub use device::{scan_devices, DeskSession};
pub use error::{DeskError, Result};
pub use motion::{MotionController, MoveReport};
pub use schedule::{run_cycle, CycleOptions};
pub use state::DeskState;
pub use telemetry::TelemetryIngestor;
pub use transport::{CharacteristicWriter, CommandSink, DeviceLink, Transport};
pub use types::{
    ConnectionParams, DeskReading, Direction, MotionConfig, Position, Prompt, ScanResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lowest height the desk reports, in centimeters
pub const MIN_DESK_HEIGHT: u8 = 65;

/// Highest height the desk reports, in centimeters
pub const MAX_DESK_HEIGHT: u8 = 130;

/// Nordic UART Service UUID
///
/// See <https://docs.nordicsemi.com/bundle/ncs-latest/page/nrf/libraries/bluetooth_services/services/nus.html>
pub const UART_SERVICE_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E);

/// UART RX characteristic: commands are written here
pub const UART_RX_CHAR_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x6E40_0002_B5A3_F393_E0A9_E50E_24DC_CA9E);

/// UART TX characteristic: the desk notifies telemetry here
pub const UART_TX_CHAR_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x6E40_0003_B5A3_F393_E0A9_E50E_24DC_CA9E);
