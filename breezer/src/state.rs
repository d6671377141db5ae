//! Device state snapshots and partial updates.

use crate::model::DeviceModel;
use log::warn;
use std::fmt;

/// Highest fan speed the breezer accepts.
pub const MAX_FAN_SPEED: u8 = 6;

/// Fan speed used in place of an out-of-range value.
pub const FALLBACK_FAN_SPEED: u8 = 1;

/// Difference between outgoing air and target above which the heater
/// is assumed idle.
const HEATING_OUT_TEMP_MARGIN: i32 = 3;

/// Where the breezer takes its air from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AirMode {
    /// Room air only.
    Recirculation,
    /// Room and street air.
    Mixed,
    /// Street air only. Unknown mode codes decode to this.
    #[default]
    Outside,
}

impl AirMode {
    /// All modes in wire order.
    pub const ALL: [Self; 3] = [Self::Recirculation, Self::Mixed, Self::Outside];

    /// Decode a raw mode code, falling back to `Outside`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Recirculation,
            1 => Self::Mixed,
            _ => Self::Outside,
        }
    }

    /// Wire index of this mode.
    pub fn index(self) -> u8 {
        match self {
            Self::Recirculation => 0,
            Self::Mixed => 1,
            Self::Outside => 2,
        }
    }

    /// Parse a mode name as used in configuration and on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "recirculation" => Some(Self::Recirculation),
            "mixed" => Some(Self::Mixed),
            "outside" | "street" => Some(Self::Outside),
            _ => None,
        }
    }
}

impl fmt::Display for AirMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recirculation => write!(f, "recirculation"),
            Self::Mixed => write!(f, "mixed"),
            Self::Outside => write!(f, "outside"),
        }
    }
}

/// Bring a requested fan speed into `0..=6`.
///
/// Anything outside the range becomes [`FALLBACK_FAN_SPEED`].
pub fn coerce_fan_speed(speed: i32) -> u8 {
    match u8::try_from(speed) {
        Ok(speed) if speed <= MAX_FAN_SPEED => speed,
        _ => {
            warn!("Incorrect fan speed {speed}, using {FALLBACK_FAN_SPEED} instead");
            FALLBACK_FAN_SPEED
        },
    }
}

/// Guess whether the heating element is running right now.
///
/// The breezer does not report this; it is inferred from the readings of a
/// single response.
pub fn heating_active(heater_on: bool, in_temp: i32, out_temp: i32, target_temp: u8) -> bool {
    if !heater_on {
        return false;
    }
    let target = i32::from(target_temp);
    in_temp < target && out_temp - target < HEATING_OUT_TEMP_MARGIN
}

/// Snapshot of the breezer state decoded from one response frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceState {
    /// Model that produced this snapshot.
    pub model: DeviceModel,
    /// Unit powered on.
    pub power: bool,
    /// Heater switched on.
    pub heater_on: bool,
    /// Heater believed to be producing heat (derived).
    pub heating_active: bool,
    /// Sound indication on.
    pub sound_on: bool,
    /// Air source.
    pub air_mode: AirMode,
    /// Fan speed, `0..=6`.
    pub fan_speed: u8,
    /// Heater setpoint in °C.
    pub target_temp: u8,
    /// Incoming air temperature in °C.
    pub in_temp: i32,
    /// Outgoing air temperature in °C.
    pub out_temp: i32,
    /// Days until the filter needs replacing.
    pub filter_remaining_days: f32,
    /// Device error code, 0 when healthy.
    pub error_code: u8,
    /// Timer active (S3).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub timer: Option<bool>,
    /// Device clock as `HH:MM` (S3).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub time_of_day: Option<String>,
    /// Productivity in m³/h (S3).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub productivity: Option<u8>,
    /// Firmware version string (S3).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub firmware_version: Option<String>,
}

impl DeviceState {
    /// An all-off state for the given model.
    pub fn new(model: DeviceModel) -> Self {
        Self {
            model,
            power: false,
            heater_on: false,
            heating_active: false,
            sound_on: false,
            air_mode: AirMode::default(),
            fan_speed: 0,
            target_temp: 0,
            in_temp: 0,
            out_temp: 0,
            filter_remaining_days: 0.0,
            error_code: 0,
            timer: None,
            time_of_day: None,
            productivity: None,
            firmware_version: None,
        }
    }

    /// Set the fan speed, coercing out-of-range values to 1.
    pub fn set_fan_speed(&mut self, speed: i32) {
        self.fan_speed = coerce_fan_speed(speed);
    }

    /// Recompute `heating_active` from this snapshot's own readings.
    pub fn update_heating(&mut self) {
        self.heating_active =
            heating_active(self.heater_on, self.in_temp, self.out_temp, self.target_temp);
    }

    /// Copy of this state with every field present in `changes` overwritten.
    #[must_use]
    pub fn merged(&self, changes: &StateChanges) -> Self {
        let mut merged = self.clone();
        if let Some(power) = changes.power {
            merged.power = power;
        }
        if let Some(heater_on) = changes.heater_on {
            merged.heater_on = heater_on;
        }
        if let Some(sound_on) = changes.sound_on {
            merged.sound_on = sound_on;
        }
        if let Some(air_mode) = changes.air_mode {
            merged.air_mode = air_mode;
        }
        if let Some(speed) = changes.fan_speed {
            merged.set_fan_speed(speed);
        }
        if let Some(target_temp) = changes.target_temp {
            merged.target_temp = target_temp;
        }
        merged
    }
}

/// A sparse set of settings to write to the breezer.
///
/// Fields left as `None` keep the value the device currently reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateChanges {
    /// Power the unit on or off.
    pub power: Option<bool>,
    /// Switch the heater.
    pub heater_on: Option<bool>,
    /// Switch sound indication.
    pub sound_on: Option<bool>,
    /// Change the air source.
    pub air_mode: Option<AirMode>,
    /// New fan speed; out-of-range values are coerced to 1.
    pub fan_speed: Option<i32>,
    /// New heater setpoint.
    pub target_temp: Option<u8>,
}

impl StateChanges {
    /// Empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set power.
    #[must_use]
    pub fn with_power(mut self, power: bool) -> Self {
        self.power = Some(power);
        self
    }

    /// Set heater.
    #[must_use]
    pub fn with_heater(mut self, heater_on: bool) -> Self {
        self.heater_on = Some(heater_on);
        self
    }

    /// Set sound.
    #[must_use]
    pub fn with_sound(mut self, sound_on: bool) -> Self {
        self.sound_on = Some(sound_on);
        self
    }

    /// Set air mode.
    #[must_use]
    pub fn with_air_mode(mut self, air_mode: AirMode) -> Self {
        self.air_mode = Some(air_mode);
        self
    }

    /// Set fan speed.
    #[must_use]
    pub fn with_fan_speed(mut self, speed: i32) -> Self {
        self.fan_speed = Some(speed);
        self
    }

    /// Set heater target temperature.
    #[must_use]
    pub fn with_target_temp(mut self, target_temp: u8) -> Self {
        self.target_temp = Some(target_temp);
        self
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_mode_codes() {
        assert_eq!(AirMode::from_code(0), AirMode::Recirculation);
        assert_eq!(AirMode::from_code(1), AirMode::Mixed);
        assert_eq!(AirMode::from_code(2), AirMode::Outside);
        assert_eq!(AirMode::from_code(9), AirMode::Outside);
        for mode in AirMode::ALL {
            assert_eq!(AirMode::from_code(mode.index()), mode);
        }
    }

    #[test]
    fn test_air_mode_from_name() {
        assert_eq!(AirMode::from_name("Mixed"), Some(AirMode::Mixed));
        assert_eq!(AirMode::from_name("street"), Some(AirMode::Outside));
        assert_eq!(AirMode::from_name("window"), None);
    }

    #[test]
    fn test_fan_speed_out_of_range_becomes_one() {
        let mut state = DeviceState::new(DeviceModel::S3);
        for speed in [-5, -1, 7, 10, 255, 1000] {
            state.set_fan_speed(speed);
            assert_eq!(state.fan_speed, 1, "speed {speed}");
        }
    }

    #[test]
    fn test_fan_speed_in_range_kept() {
        let mut state = DeviceState::new(DeviceModel::S3);
        for speed in 0..=6 {
            state.set_fan_speed(speed);
            assert_eq!(i32::from(state.fan_speed), speed);
        }
    }

    #[test]
    fn test_heating_off_when_heater_off() {
        assert!(!heating_active(false, -20, -20, 25));
        assert!(!heating_active(false, 18, 23, 22));
    }

    #[test]
    fn test_heating_active_when_warming_up() {
        assert!(heating_active(true, 18, 23, 22));
    }

    #[test]
    fn test_heating_inactive_when_room_warm() {
        assert!(!heating_active(true, 25, 23, 22));
    }

    #[test]
    fn test_heating_inactive_when_output_well_above_target() {
        // 25 - 22 = 3 is not below the margin
        assert!(!heating_active(true, 18, 25, 22));
    }

    #[test]
    fn test_merged_overwrites_only_given_fields() {
        let mut current = DeviceState::new(DeviceModel::S3);
        current.power = true;
        current.fan_speed = 3;
        current.target_temp = 20;
        current.air_mode = AirMode::Mixed;
        current.in_temp = 12;

        let changes = StateChanges::new().with_fan_speed(5).with_heater(true);
        let merged = current.merged(&changes);

        assert_eq!(merged.fan_speed, 5);
        assert!(merged.heater_on);
        assert!(merged.power);
        assert_eq!(merged.target_temp, 20);
        assert_eq!(merged.air_mode, AirMode::Mixed);
        assert_eq!(merged.in_temp, 12);
    }

    #[test]
    fn test_merged_coerces_fan_speed() {
        let current = DeviceState::new(DeviceModel::S3);
        let merged = current.merged(&StateChanges::new().with_fan_speed(9));
        assert_eq!(merged.fan_speed, 1);
    }

    #[test]
    fn test_state_changes_is_empty() {
        assert!(StateChanges::new().is_empty());
        assert!(!StateChanges::new().with_power(false).is_empty());
    }
}
