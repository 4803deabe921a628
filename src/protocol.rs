use crate::types::{DeskReading, Direction};
use bytes::{Buf, Bytes};

/// Command size in bytes
pub const COMMAND_SIZE: usize = 5;

/// Move-up command constant, as sent by the "STANDUP! pls" application
///
/// The desk moves at its default speed for as long as this command keeps
/// arriving. It must be repeated every few hundred milliseconds.
pub const UP_COMMAND: u64 = 0x00D9_FF01_633C;

/// Move-down command constant, as sent by the "STANDUP! pls" application
pub const DOWN_COMMAND: u64 = 0x00D9_FF02_603A;

/// Stop command: five zero bytes
///
/// Besides halting the motor, the desk answers it with a telemetry frame,
/// which is how a fresh session learns the current height.
pub const STOP_COMMAND: [u8; COMMAND_SIZE] = [0x00; COMMAND_SIZE];

/// Shortest frame that carries both speed and height
pub const MIN_TELEMETRY_LEN: usize = 4;

/// Serialize a 40-bit command constant into 5 big-endian bytes
#[must_use]
pub const fn encode_command(command: u64) -> [u8; COMMAND_SIZE] {
    let mut data = [0u8; COMMAND_SIZE];
    let mut i = COMMAND_SIZE;
    while i > 0 {
        i -= 1;
        data[COMMAND_SIZE - 1 - i] = ((command >> (8 * i)) & 0xFF) as u8;
    }
    data
}

/// Read a 5-byte big-endian command back into its 40-bit constant
#[must_use]
pub fn decode_command(data: &[u8]) -> Option<u64> {
    if data.len() != COMMAND_SIZE {
        return None;
    }
    Some(data.iter().fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte)))
}

/// Move command for one direction, encoded once per move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionCommand {
    /// Direction of travel
    pub direction: Direction,
    payload: Bytes,
}

impl MotionCommand {
    /// Build the command for a direction
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        let payload = Bytes::copy_from_slice(&encode_command(direction.command_constant()));
        Self { direction, payload }
    }

    /// Wire bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Wire bytes as a cheaply clonable buffer
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.payload.clone()
    }
}

/// Parse a telemetry notification from the desk
///
/// Frame layout:
/// - Byte 0: unused
/// - Byte 1: speed
/// - Byte 2: unused
/// - Byte 3: height in centimeters
///
/// Anything after byte 3 is ignored. Returns `None` for frames shorter than
/// [`MIN_TELEMETRY_LEN`].
#[must_use]
pub fn parse_telemetry(data: &[u8]) -> Option<DeskReading> {
    if data.len() < MIN_TELEMETRY_LEN {
        return None;
    }

    let mut buf = data;
    buf.advance(1);
    let speed = buf.get_u8();
    buf.advance(1);
    let height = buf.get_u8();

    Some(DeskReading::new(height, speed))
}
