//! Breezer command frames.
//!
//! Every command the client sends is a fixed 20-byte frame:
//!
//! ```text
//! +--------+------+------+--------------------------------+--------+
//! | Prefix | Type | Byte2| Payload (bytes 3..=18)         | Suffix |
//! +--------+------+------+--------------------------------+--------+
//! | 61     | cmd  | flag | zero for REQUEST / PAIR        | 90     |
//! +--------+------+------+--------------------------------+--------+
//! ```
//!
//! SET_PARAMS reuses byte 2 for the packed mode/fan speed and fills
//! bytes 3 and 4 with the target temperature and the switch bitmask.

use crate::state::{DeviceState, coerce_fan_speed};

/// Length of every command and response frame.
pub const FRAME_LEN: usize = 20;

/// First byte of every frame (0x3D).
pub const FRAME_PREFIX: u8 = 61;

/// Last byte of every frame (0x5A).
pub const FRAME_SUFFIX: u8 = 90;

/// Bit positions inside the switch bitmask (byte 4).
pub mod flags {
    /// Heater switched on.
    pub const HEATER: u8 = 0;
    /// Unit powered on.
    pub const POWER: u8 = 1;
    /// Timer active (S3 only, response frames).
    pub const TIMER: u8 = 2;
    /// Sound indication on.
    pub const SOUND: u8 = 3;
}

/// Command types understood by the breezer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    /// Query current parameters.
    RequestParams = 1,
    /// Apply a full parameter set.
    SetParams = 2,
    /// First-time association.
    Pair = 5,
}

impl CommandType {
    /// Value of byte 2 for commands that carry no payload.
    pub fn flag(self) -> u8 {
        u8::from(self == Self::Pair)
    }
}

/// A 20-byte command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    command: CommandType,
    bytes: [u8; FRAME_LEN],
}

impl CommandFrame {
    /// Create an empty frame for the given command.
    pub fn new(command: CommandType) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = FRAME_PREFIX;
        bytes[1] = command as u8;
        bytes[2] = command.flag();
        bytes[FRAME_LEN - 1] = FRAME_SUFFIX;
        Self { command, bytes }
    }

    /// Build a REQUEST_PARAMS frame.
    pub fn request() -> Self {
        Self::new(CommandType::RequestParams)
    }

    /// Build a PAIR frame.
    pub fn pair() -> Self {
        Self::new(CommandType::Pair)
    }

    /// Build a SET_PARAMS frame carrying the full state.
    ///
    /// Byte 2 packs mode and fan speed as two decimal digits
    /// (`10 * mode + fan`), the same convention the decoder uses.
    /// An out-of-range fan speed is sent as the fallback speed.
    pub fn set_params(state: &DeviceState) -> Self {
        let mut frame = Self::new(CommandType::SetParams);
        let fan_speed = coerce_fan_speed(i32::from(state.fan_speed));
        frame.bytes[2] = state.air_mode.index() * 10 + fan_speed;
        frame.bytes[3] = state.target_temp;
        frame.bytes[4] = encode_bool(state.heater_on) << flags::HEATER
            | encode_bool(state.power) << flags::POWER
            | encode_bool(state.sound_on) << flags::SOUND;
        frame
    }

    /// Get the command type.
    pub fn command(&self) -> CommandType {
        self.command
    }

    /// The raw frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn encode_bool(value: bool) -> u8 {
    u8::from(value)
}
