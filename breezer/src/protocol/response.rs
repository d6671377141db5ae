//! Breezer response decoding.
//!
//! ## Response Layout
//!
//! ```text
//! offset  meaning
//! 0       prefix (61)
//! 1       command type
//! 2       mode (tens digit) and fan speed (units digit)
//! 3       heater target temperature
//! 4       bit0 heater, bit1 power, bit2 timer, bit3 sound
//! 7       outgoing air temperature (signed)
//! 8       incoming air temperature (signed)
//! 9..=10  filter days remaining, little-endian
//! 13      error code
//! 11..=18 model dependent
//! 19      suffix (90)
//! ```

use crate::error::{Error, Result, hex};
use crate::model::DeviceProfile;
use crate::protocol::frame::flags;
use crate::state::{AirMode, DeviceState, coerce_fan_speed};
use byteorder::{ByteOrder, LittleEndian};
use log::trace;

/// Offset of the packed mode/fan speed byte.
pub const MODE_FAN_OFFSET: usize = 2;
/// Offset of the heater target temperature.
pub const TARGET_TEMP_OFFSET: usize = 3;
/// Offset of the switch bitmask.
pub const FLAGS_OFFSET: usize = 4;
/// Offset of the outgoing air temperature.
pub const OUT_TEMP_OFFSET: usize = 7;
/// Offset of the incoming air temperature.
pub const IN_TEMP_OFFSET: usize = 8;
/// Offset of the filter counter (two bytes, little-endian).
pub const FILTER_OFFSET: usize = 9;
/// Offset of the error code.
pub const ERROR_CODE_OFFSET: usize = 13;

/// Values at or above this byte value are negative temperatures.
const TEMPERATURE_BARRIER: i32 = 0b1000_0000;

/// Decode a temperature byte using the breezer's signed encoding.
///
/// Raw values below 128 are taken as-is; values from 128 upward are folded
/// around the 128 barrier into negative temperatures.
pub fn decode_signed_temperature(raw: u8) -> i32 {
    let raw = i32::from(raw);
    if raw < TEMPERATURE_BARRIER {
        raw
    } else {
        -(!(raw - TEMPERATURE_BARRIER) + TEMPERATURE_BARRIER + 1)
    }
}

/// Encode a temperature the way the breezer reports it.
///
/// Values outside `-128..=127` are clamped.
pub fn encode_signed_temperature(celsius: i32) -> u8 {
    let wrapped = celsius.clamp(-128, 127).rem_euclid(256);
    u8::try_from(wrapped).unwrap_or_default()
}

/// Read one byte of a response, failing with a protocol error if it is missing.
pub(crate) fn byte_at(response: &[u8], index: usize) -> Result<u8> {
    response
        .get(index)
        .copied()
        .ok_or_else(|| Error::protocol("response too short", index, response))
}

/// Test one bit of a response byte.
pub(crate) fn bit_at(response: &[u8], index: usize, bit: u8) -> Result<bool> {
    Ok(byte_at(response, index)? >> bit & 1 == 1)
}

/// Decode a response frame into a [`DeviceState`].
///
/// Model-specific fields are read by `profile`. Any missing byte aborts the
/// whole decode; a partially filled state is never returned. The
/// `heating_active` flag is left for the caller to compute.
pub fn decode(response: &[u8], profile: &dyn DeviceProfile) -> Result<DeviceState> {
    trace!("Decoding response {}", hex(response));

    let packed = byte_at(response, MODE_FAN_OFFSET)?;
    let mode_code = packed / 10;
    let fan_digit = packed % 10;

    let mut state = DeviceState::new(profile.model());
    state.air_mode = AirMode::from_code(mode_code);
    state.fan_speed = coerce_fan_speed(i32::from(fan_digit));
    state.heater_on = bit_at(response, FLAGS_OFFSET, flags::HEATER)?;
    state.power = bit_at(response, FLAGS_OFFSET, flags::POWER)?;
    state.sound_on = bit_at(response, FLAGS_OFFSET, flags::SOUND)?;
    state.target_temp = byte_at(response, TARGET_TEMP_OFFSET)?;
    state.out_temp = decode_signed_temperature(byte_at(response, OUT_TEMP_OFFSET)?);
    state.in_temp = decode_signed_temperature(byte_at(response, IN_TEMP_OFFSET)?);

    let filter = response
        .get(FILTER_OFFSET..FILTER_OFFSET + 2)
        .ok_or_else(|| Error::protocol("response too short", FILTER_OFFSET + 1, response))?;
    state.filter_remaining_days = f32::from(LittleEndian::read_u16(filter));

    state.error_code = byte_at(response, ERROR_CODE_OFFSET)?;

    let extras = profile.decode_extras(response)?;
    state.timer = extras.timer;
    state.time_of_day = extras.time_of_day;
    state.productivity = extras.productivity;
    state.firmware_version = extras.firmware_version;

    Ok(state)
}
