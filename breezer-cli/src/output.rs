//! Printing device state for humans and machines.

use anyhow::Result;
use breezer::DeviceState;
use breezer::state::MAX_FAN_SPEED;
use console::style;

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

/// Label/value pairs describing a state, in display order.
pub fn state_rows(state: &DeviceState) -> Vec<(&'static str, String)> {
    let heater = match (state.heater_on, state.heating_active) {
        (false, _) => "off".to_string(),
        (true, true) => "on (heating)".to_string(),
        (true, false) => "on (idle)".to_string(),
    };

    let mut rows = vec![
        ("Power", on_off(state.power).to_string()),
        ("Heater", heater),
        ("Sound", on_off(state.sound_on).to_string()),
        ("Air mode", state.air_mode.to_string()),
        ("Fan speed", format!("{}/{MAX_FAN_SPEED}", state.fan_speed)),
        ("Target", format!("{} °C", state.target_temp)),
        ("Incoming air", format!("{} °C", state.in_temp)),
        ("Outgoing air", format!("{} °C", state.out_temp)),
        (
            "Filter",
            format!("{:.0} days left", state.filter_remaining_days),
        ),
        ("Error code", state.error_code.to_string()),
    ];

    if let Some(timer) = state.timer {
        rows.push(("Timer", on_off(timer).to_string()));
    }
    if let Some(time) = &state.time_of_day {
        rows.push(("Device clock", time.clone()));
    }
    if let Some(productivity) = state.productivity {
        rows.push(("Productivity", format!("{productivity} m³/h")));
    }
    if let Some(firmware) = &state.firmware_version {
        rows.push(("Firmware", firmware.clone()));
    }

    rows
}

/// Print a state as an aligned table on stdout.
pub fn print_state(state: &DeviceState) {
    println!(
        "{}",
        style(format!("Tion {} breezer", state.model))
            .bold()
            .underlined()
    );
    for (label, value) in state_rows(state) {
        let value = if label == "Error code" && state.error_code != 0 {
            style(value).red().bold().to_string()
        } else {
            value
        };
        println!("  {:<14} {value}", format!("{label}:"));
    }
}

/// Print a state as pretty JSON on stdout.
pub fn print_json(state: &DeviceState) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use breezer::DeviceModel;

    fn value<'a>(rows: &'a [(&'static str, String)], label: &str) -> Option<&'a str> {
        rows.iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_rows_for_lite() {
        let mut state = DeviceState::new(DeviceModel::Lite);
        state.power = true;
        state.fan_speed = 3;
        state.in_temp = -4;

        let rows = state_rows(&state);
        assert_eq!(value(&rows, "Power"), Some("on"));
        assert_eq!(value(&rows, "Heater"), Some("off"));
        assert_eq!(value(&rows, "Fan speed"), Some("3/6"));
        assert_eq!(value(&rows, "Incoming air"), Some("-4 °C"));
        assert!(value(&rows, "Firmware").is_none());
    }

    #[test]
    fn test_rows_for_s3_extras() {
        let mut state = DeviceState::new(DeviceModel::S3);
        state.heater_on = true;
        state.heating_active = true;
        state.timer = Some(false);
        state.time_of_day = Some("07:05".into());
        state.productivity = Some(60);
        state.firmware_version = Some("002c".into());

        let rows = state_rows(&state);
        assert_eq!(value(&rows, "Heater"), Some("on (heating)"));
        assert_eq!(value(&rows, "Timer"), Some("off"));
        assert_eq!(value(&rows, "Device clock"), Some("07:05"));
        assert_eq!(value(&rows, "Productivity"), Some("60 m³/h"));
        assert_eq!(value(&rows, "Firmware"), Some("002c"));
    }
}
