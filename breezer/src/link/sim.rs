//! In-process breezer.
//!
//! [`SimulatedBreezer`] implements [`Link`] against a device model held in
//! memory. It answers REQUEST_PARAMS and SET_PARAMS with response frames,
//! remembers PAIR, and can be told to misbehave through a [`SimControl`]
//! handle. Used by the test suites and by the CLI's `--simulate` mode.

use super::{CCCD_ENABLE_NOTIFICATIONS, Characteristic, Link, NotificationSink};
use crate::error::{Error, Result, hex};
use crate::model::DeviceModel;
use crate::protocol::frame::flags;
use crate::protocol::{CommandType, FRAME_LEN, FRAME_PREFIX, FRAME_SUFFIX, encode_signed_temperature};
use crate::state::{AirMode, DeviceState, coerce_fan_speed};
use log::{debug, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::{Uuid, uuid};

/// Handle of the device name characteristic.
pub const NAME_HANDLE: u16 = 0x0003;
/// Handle of the write characteristic.
pub const WRITE_HANDLE: u16 = 0x000d;
/// Handle of the notify characteristic. Its CCCD follows at `+1`.
pub const NOTIFY_HANDLE: u16 = 0x0010;

const DEVICE_NAME_UUID: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");
const DEVICE_NAME: &[u8] = b"Tion Breezer";

#[derive(Debug)]
struct SimState {
    model: DeviceModel,
    write_uuid: Uuid,
    notify_uuid: Uuid,
    device: DeviceState,
    filter_days: u16,
    clock: (u8, u8),
    productivity: u8,
    firmware: u16,
    connected: bool,
    notifications_enabled: bool,
    sink: Option<NotificationSink>,
    last_frame: Vec<u8>,
    paired: bool,
    connects: u32,
    fail_connects: u32,
    fail_writes: u32,
    fail_command: Option<CommandType>,
    truncate_to: Option<usize>,
    muted: bool,
    blank_reads: bool,
    written: Vec<Vec<u8>>,
}

impl SimState {
    fn new(model: DeviceModel) -> Self {
        let profile = model.profile();
        let mut device = DeviceState::new(model);
        device.power = true;
        device.heater_on = true;
        device.air_mode = AirMode::Outside;
        device.fan_speed = 2;
        device.target_temp = 20;
        device.in_temp = 5;
        device.out_temp = 18;

        Self {
            model,
            write_uuid: profile.write_uuid(),
            notify_uuid: profile.notify_uuid(),
            device,
            filter_days: 180,
            clock: (12, 0),
            productivity: 40,
            firmware: 0x002c,
            connected: false,
            notifications_enabled: false,
            sink: None,
            last_frame: Vec::new(),
            paired: false,
            connects: 0,
            fail_connects: 0,
            fail_writes: 0,
            fail_command: None,
            truncate_to: None,
            muted: false,
            blank_reads: false,
            written: Vec::new(),
        }
    }

    fn drop_link(&mut self) {
        self.connected = false;
        self.notifications_enabled = false;
        self.sink = None;
    }

    /// Build the response frame for the current device state.
    fn response_frame(&self, command: CommandType) -> Vec<u8> {
        let device = &self.device;
        let mut frame = vec![0u8; FRAME_LEN];
        frame[0] = FRAME_PREFIX;
        frame[1] = command as u8;
        let fan_speed = coerce_fan_speed(i32::from(device.fan_speed));
        frame[2] = device.air_mode.index() * 10 + fan_speed;
        frame[3] = device.target_temp;
        frame[4] = u8::from(device.heater_on) << flags::HEATER
            | u8::from(device.power) << flags::POWER
            | u8::from(device.timer.unwrap_or(false)) << flags::TIMER
            | u8::from(device.sound_on) << flags::SOUND;
        frame[7] = encode_signed_temperature(device.out_temp);
        frame[8] = encode_signed_temperature(device.in_temp);
        frame[9..11].copy_from_slice(&self.filter_days.to_le_bytes());
        frame[13] = device.error_code;

        if self.model == DeviceModel::S3 {
            let [firmware_high, firmware_low] = self.firmware.to_be_bytes();
            frame[11] = self.clock.0;
            frame[12] = self.clock.1;
            frame[14] = self.productivity;
            frame[17] = firmware_low;
            frame[18] = firmware_high;
        }

        frame[FRAME_LEN - 1] = FRAME_SUFFIX;
        frame
    }

    fn respond(&mut self, command: CommandType) {
        let mut frame = self.response_frame(command);
        if let Some(len) = self.truncate_to {
            frame.truncate(len);
        }
        trace!("Simulated breezer responds {}", hex(&frame));
        self.last_frame.clone_from(&frame);

        if self.muted || !self.notifications_enabled {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.deliver(frame);
        }
    }

    fn apply_set(&mut self, frame: &[u8]) {
        let packed = frame[2];
        self.device.air_mode = AirMode::from_code(packed / 10);
        self.device.set_fan_speed(i32::from(packed % 10));
        self.device.target_temp = frame[3];
        self.device.heater_on = frame[4] >> flags::HEATER & 1 == 1;
        self.device.power = frame[4] >> flags::POWER & 1 == 1;
        self.device.sound_on = frame[4] >> flags::SOUND & 1 == 1;
        debug!(
            "Simulated breezer now power={} heater={} mode={} fan={} target={}",
            self.device.power,
            self.device.heater_on,
            self.device.air_mode,
            self.device.fan_speed,
            self.device.target_temp
        );
    }

    fn handle_command(&mut self, frame: &[u8]) {
        if frame.len() != FRAME_LEN || frame[0] != FRAME_PREFIX || frame[FRAME_LEN - 1] != FRAME_SUFFIX
        {
            warn!("Simulated breezer ignoring malformed frame {}", hex(frame));
            return;
        }

        match frame[1] {
            1 => self.respond(CommandType::RequestParams),
            2 => {
                self.apply_set(frame);
                self.respond(CommandType::SetParams);
            },
            5 => {
                debug!("Simulated breezer paired");
                self.paired = true;
            },
            other => warn!("Simulated breezer ignoring unknown command {other}"),
        }
    }
}

/// A breezer living in memory.
#[derive(Debug)]
pub struct SimulatedBreezer {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedBreezer {
    /// Create a powered-on simulated device of the given model.
    pub fn new(model: DeviceModel) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SimState::new(model))),
        }
    }

    /// Get a control handle that stays valid after the link is moved into a client.
    pub fn control(&self) -> SimControl {
        SimControl {
            shared: Arc::clone(&self.shared),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Link for SimulatedBreezer {
    fn connect(&mut self, address: &str) -> Result<()> {
        let mut sim = self.lock();
        sim.connects += 1;

        if sim.fail_connects > 0 {
            sim.fail_connects -= 1;
            return Err(Error::Disconnected(format!(
                "simulated disconnect while connecting to {address}"
            )));
        }

        debug!("Simulated breezer connected as {address}");
        sim.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.lock().drop_link();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn characteristics(&mut self) -> Result<Vec<Characteristic>> {
        let sim = self.lock();
        if !sim.connected {
            return Err(Error::Disconnected("not connected".into()));
        }

        Ok(vec![
            Characteristic {
                uuid: DEVICE_NAME_UUID,
                handle: NAME_HANDLE,
            },
            Characteristic {
                uuid: sim.write_uuid,
                handle: WRITE_HANDLE,
            },
            Characteristic {
                uuid: sim.notify_uuid,
                handle: NOTIFY_HANDLE,
            },
        ])
    }

    fn write(&mut self, handle: u16, data: &[u8], _with_response: bool) -> Result<()> {
        let mut sim = self.lock();
        if !sim.connected {
            return Err(Error::Disconnected("not connected".into()));
        }

        match handle {
            WRITE_HANDLE => {
                let targeted = sim
                    .fail_command
                    .is_none_or(|command| data.get(1) == Some(&(command as u8)));
                if sim.fail_writes > 0 && targeted {
                    sim.fail_writes -= 1;
                    sim.drop_link();
                    return Err(Error::Disconnected("simulated link loss during write".into()));
                }
                sim.written.push(data.to_vec());
                sim.handle_command(data);
                Ok(())
            },
            h if h == NOTIFY_HANDLE + 1 => {
                sim.notifications_enabled = data == CCCD_ENABLE_NOTIFICATIONS;
                Ok(())
            },
            other => Err(Error::Connection(format!(
                "handle {other:#06x} is not writable"
            ))),
        }
    }

    fn read(&mut self, handle: u16) -> Result<Vec<u8>> {
        let sim = self.lock();
        if !sim.connected {
            return Err(Error::Disconnected("not connected".into()));
        }

        match handle {
            NAME_HANDLE => Ok(DEVICE_NAME.to_vec()),
            NOTIFY_HANDLE if sim.blank_reads => Ok(Vec::new()),
            NOTIFY_HANDLE => Ok(sim.last_frame.clone()),
            other => Err(Error::Connection(format!(
                "handle {other:#06x} is not readable"
            ))),
        }
    }

    fn bind_notifications(&mut self, sink: NotificationSink) -> Result<()> {
        self.lock().sink = Some(sink);
        Ok(())
    }
}

/// Control handle for a [`SimulatedBreezer`].
#[derive(Debug, Clone)]
pub struct SimControl {
    shared: Arc<Mutex<SimState>>,
}

impl SimControl {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current settings and readings of the simulated device.
    pub fn state(&self) -> DeviceState {
        self.lock().device.clone()
    }

    /// Modify the simulated device in place.
    pub fn update<F: FnOnce(&mut DeviceState)>(&self, f: F) {
        f(&mut self.lock().device);
    }

    /// Set the device clock reported by S3 responses.
    pub fn set_clock(&self, hours: u8, minutes: u8) {
        self.lock().clock = (hours, minutes);
    }

    /// Make the next `count` connects fail with a disconnect.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().fail_connects = count;
    }

    /// Make the next `count` command writes drop the link.
    pub fn fail_next_writes(&self, count: u32) {
        let mut sim = self.lock();
        sim.fail_writes = count;
        sim.fail_command = None;
    }

    /// Make the next `count` writes of `command` frames drop the link.
    /// Other commands go through.
    pub fn fail_next_writes_of(&self, command: CommandType, count: u32) {
        let mut sim = self.lock();
        sim.fail_writes = count;
        sim.fail_command = Some(command);
    }

    /// Cut every response frame down to `len` bytes.
    pub fn truncate_responses(&self, len: usize) {
        self.lock().truncate_to = Some(len);
    }

    /// Stop (or resume) sending notifications.
    pub fn mute_notifications(&self, muted: bool) {
        self.lock().muted = muted;
    }

    /// Make direct reads of the notify characteristic return nothing.
    pub fn blank_reads(&self, blank: bool) {
        self.lock().blank_reads = blank;
    }

    /// Drop the link as if the device went out of range.
    pub fn drop_link(&self) {
        self.lock().drop_link();
    }

    /// Number of connect attempts seen.
    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    /// Whether the link is up.
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Whether notifications are enabled through the CCCD.
    pub fn notifications_enabled(&self) -> bool {
        self.lock().notifications_enabled
    }

    /// Whether a PAIR frame was received.
    pub fn is_paired(&self) -> bool {
        self.lock().paired
    }

    /// Every command frame written so far.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationListener;
    use crate::protocol::{CommandFrame, decode};
    use std::time::Duration;

    fn connected(model: DeviceModel) -> (SimulatedBreezer, NotificationListener) {
        let mut sim = SimulatedBreezer::new(model);
        let listener = NotificationListener::new(4, Duration::from_millis(5), 1);
        sim.connect("sim").unwrap();
        sim.write(NOTIFY_HANDLE + 1, &CCCD_ENABLE_NOTIFICATIONS, true)
            .unwrap();
        sim.bind_notifications(listener.sink()).unwrap();
        (sim, listener)
    }

    #[test]
    fn test_request_is_answered_by_notification() {
        let (mut sim, listener) = connected(DeviceModel::S3);
        sim.write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap();

        let frame = listener.try_next().unwrap();
        let profile = DeviceModel::S3.profile();
        let state = decode(&frame, profile.as_ref()).unwrap();
        assert!(state.power);
        assert_eq!(state.fan_speed, 2);
        assert_eq!(state.firmware_version.as_deref(), Some("002c"));
    }

    #[test]
    fn test_no_notification_without_cccd() {
        let mut sim = SimulatedBreezer::new(DeviceModel::Lite);
        let listener = NotificationListener::new(4, Duration::from_millis(5), 1);
        sim.connect("sim").unwrap();
        sim.bind_notifications(listener.sink()).unwrap();
        sim.write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap();

        assert!(listener.try_next().is_none());
        // The value is still readable directly
        assert_eq!(sim.read(NOTIFY_HANDLE).unwrap().len(), FRAME_LEN);
    }

    #[test]
    fn test_set_updates_device() {
        let (mut sim, _listener) = connected(DeviceModel::S3);
        let control = sim.control();

        let mut wanted = control.state();
        wanted.fan_speed = 5;
        wanted.air_mode = AirMode::Mixed;
        wanted.sound_on = true;
        sim.write(WRITE_HANDLE, CommandFrame::set_params(&wanted).as_bytes(), true)
            .unwrap();

        let state = control.state();
        assert_eq!(state.fan_speed, 5);
        assert_eq!(state.air_mode, AirMode::Mixed);
        assert!(state.sound_on);
        assert_eq!(control.written_frames().len(), 1);
    }

    #[test]
    fn test_lite_response_has_no_extras() {
        let (mut sim, listener) = connected(DeviceModel::Lite);
        sim.write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap();
        let frame = listener.try_next().unwrap();
        assert!(frame[11..19].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_negative_readings_encoded() {
        let (mut sim, listener) = connected(DeviceModel::S3);
        sim.control().update(|d| d.out_temp = -12);
        sim.write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap();

        let frame = listener.try_next().unwrap();
        let profile = DeviceModel::S3.profile();
        assert_eq!(decode(&frame, profile.as_ref()).unwrap().out_temp, -12);
    }

    #[test]
    fn test_failed_write_drops_link() {
        let (mut sim, _listener) = connected(DeviceModel::S3);
        let control = sim.control();
        control.fail_next_writes(1);

        let err = sim
            .write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap_err();
        assert!(err.is_disconnect());
        assert!(!sim.is_connected());
        assert!(!control.notifications_enabled());
    }

    #[test]
    fn test_operations_need_connection() {
        let mut sim = SimulatedBreezer::new(DeviceModel::S3);
        assert!(sim.characteristics().unwrap_err().is_disconnect());
        assert!(sim.read(NOTIFY_HANDLE).unwrap_err().is_disconnect());
        assert!(sim.disconnect().is_ok());
    }

    #[test]
    fn test_truncated_responses() {
        let (mut sim, listener) = connected(DeviceModel::S3);
        sim.control().truncate_responses(5);
        sim.write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap();

        assert_eq!(listener.try_next().unwrap().len(), 5);
        assert_eq!(sim.read(NOTIFY_HANDLE).unwrap().len(), 5);
    }

    #[test]
    fn test_targeted_write_failure() {
        let (mut sim, _listener) = connected(DeviceModel::S3);
        let control = sim.control();
        control.fail_next_writes_of(CommandType::SetParams, 1);

        sim.write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap();
        let err = sim
            .write(WRITE_HANDLE, CommandFrame::set_params(&control.state()).as_bytes(), true)
            .unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(control.written_frames().len(), 1);
    }

    #[test]
    fn test_out_of_range_fan_reported_as_fallback() {
        let (mut sim, listener) = connected(DeviceModel::Lite);
        sim.control().update(|d| d.fan_speed = 200);
        sim.write(WRITE_HANDLE, CommandFrame::request().as_bytes(), true)
            .unwrap();

        let frame = listener.try_next().unwrap();
        assert_eq!(frame[2], 21);
    }
}
