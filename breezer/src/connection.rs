//! Connection lifecycle for one breezer.
//!
//! [`ConnectionManager`] exclusively owns the link, the resolved
//! characteristics and the connection state. A connect that hits a
//! disconnect-class error is tried exactly once more after a pause; a second
//! consecutive failure is returned to the caller.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                             |  ^                 |
//!              1st disconnect |  | pause           | disconnect / link drop
//!                             +--+                 v
//!                  2nd failure ------------> Disconnected
//! ```

use crate::error::{Error, Result, hex};
use crate::link::{CCCD_ENABLE_NOTIFICATIONS, Characteristic, Link, NotificationSink};
use crate::model::DeviceProfile;
use crate::notify::DirectRead;
use crate::protocol::CommandFrame;
use crate::retry::Reconnect;
use log::{debug, info, trace, warn};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Extra connect attempts after a disconnect-class failure.
const MAX_EXTRA_CONNECTS: u32 = 1;

/// Command frames are written with acknowledgement.
const COMMAND_WRITE_WITH_RESPONSE: bool = true;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link.
    #[default]
    Disconnected,
    /// Link being opened.
    Connecting,
    /// Link up and characteristics resolved.
    Connected,
}

/// Owner of the link handle for one device.
pub struct ConnectionManager<L: Link> {
    link: L,
    address: String,
    write_uuid: Uuid,
    notify_uuid: Uuid,
    sink: NotificationSink,
    write: Option<Characteristic>,
    notify: Option<Characteristic>,
    state: ConnectionState,
    require_notifications: bool,
    notifications_enabled: bool,
    failed_connects: u32,
    reconnect_delay: Duration,
}

impl<L: Link> ConnectionManager<L> {
    /// Create a manager for the device at `address`.
    ///
    /// # Arguments
    ///
    /// * `link` - Link implementation, not yet connected
    /// * `address` - Device address passed to [`Link::connect`]
    /// * `profile` - Supplies the write/notify characteristic UUIDs
    /// * `sink` - Where notifications are routed once enabled
    pub fn new(
        link: L,
        address: impl Into<String>,
        profile: &dyn DeviceProfile,
        sink: NotificationSink,
    ) -> Self {
        Self {
            link,
            address: address.into(),
            write_uuid: profile.write_uuid(),
            notify_uuid: profile.notify_uuid(),
            sink,
            write: None,
            notify: None,
            state: ConnectionState::Disconnected,
            require_notifications: true,
            notifications_enabled: false,
            failed_connects: 0,
            reconnect_delay: crate::config::DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Set the pause before the extra connect attempt.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Device address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connected and the link agrees.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.link.is_connected()
    }

    /// Connect to the device.
    ///
    /// Resolves the write and notify characteristics and, if
    /// `require_notifications`, enables notifications through the CCCD and
    /// binds the notification queue. Calling this while connected only
    /// enables notifications if they are newly required.
    pub fn connect(&mut self, require_notifications: bool) -> Result<()> {
        self.require_notifications = require_notifications;

        if self.is_connected() && (self.notifications_enabled || !require_notifications) {
            trace!("Already connected to {}", self.address);
            return Ok(());
        }

        loop {
            self.state = ConnectionState::Connecting;

            match self.try_connect(require_notifications) {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    self.failed_connects = 0;
                    info!("Connected to {}", self.address);
                    return Ok(());
                },
                Err(e) if e.is_disconnect() && self.failed_connects < MAX_EXTRA_CONNECTS => {
                    self.failed_connects += 1;
                    warn!(
                        "Got disconnect while connecting to {}: {e}. Trying again in {:?}",
                        self.address, self.reconnect_delay
                    );
                    thread::sleep(self.reconnect_delay);
                },
                Err(e) => {
                    self.failed_connects = 0;
                    self.reset();
                    if let Err(teardown) = self.link.disconnect() {
                        debug!("Teardown after failed connect also failed: {teardown}");
                    }
                    return Err(e);
                },
            }
        }
    }

    /// Single connection attempt.
    fn try_connect(&mut self, require_notifications: bool) -> Result<()> {
        if !self.link.is_connected() {
            debug!("Connecting to {}", self.address);
            self.notifications_enabled = false;
            self.link.connect(&self.address)?;
        }

        self.resolve_characteristics()?;

        if require_notifications {
            if !self.notifications_enabled {
                self.enable_notifications()?;
            }
        } else {
            debug!("Notifications were not requested");
        }

        Ok(())
    }

    fn resolve_characteristics(&mut self) -> Result<()> {
        let characteristics = self.link.characteristics()?;
        let find = |uuid: Uuid| characteristics.iter().find(|c| c.uuid == uuid).copied();

        let write = find(self.write_uuid).ok_or_else(|| {
            Error::Connection(format!("write characteristic {} not found", self.write_uuid))
        })?;
        let notify = find(self.notify_uuid).ok_or_else(|| {
            Error::Connection(format!(
                "notify characteristic {} not found",
                self.notify_uuid
            ))
        })?;

        trace!(
            "Write handle {:#06x}, notify handle {:#06x}",
            write.handle, notify.handle
        );
        self.write = Some(write);
        self.notify = Some(notify);
        Ok(())
    }

    fn enable_notifications(&mut self) -> Result<()> {
        let cccd = self.notify_characteristic()?.cccd_handle()?;
        debug!(
            "Enabling notifications: writing {} to handle {cccd:#06x}",
            hex(&CCCD_ENABLE_NOTIFICATIONS)
        );
        self.link.write(cccd, &CCCD_ENABLE_NOTIFICATIONS, true)?;
        self.link.bind_notifications(self.sink.clone())?;
        self.notifications_enabled = true;
        Ok(())
    }

    /// Tear the link down. Safe to call when already disconnected.
    pub fn disconnect(&mut self) -> Result<()> {
        debug!("Disconnecting from {}", self.address);
        self.reset();
        self.link.disconnect()
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.notifications_enabled = false;
        self.write = None;
        self.notify = None;
    }

    /// Write a command frame to the write characteristic.
    pub fn write_frame(&mut self, frame: &CommandFrame) -> Result<()> {
        let handle = self.write_characteristic()?.handle;
        trace!(
            "Writing {:?} frame {}",
            frame.command(),
            hex(frame.as_bytes())
        );
        self.link
            .write(handle, frame.as_bytes(), COMMAND_WRITE_WITH_RESPONSE)
    }

    /// Read the notify characteristic directly.
    pub fn read_notify(&mut self) -> Result<Vec<u8>> {
        let handle = self.notify_characteristic()?.handle;
        let data = self.link.read(handle)?;
        trace!("Read {} from notify characteristic", hex(&data));
        Ok(data)
    }

    fn write_characteristic(&self) -> Result<Characteristic> {
        self.write
            .ok_or_else(|| Error::Disconnected(format!("not connected to {}", self.address)))
    }

    fn notify_characteristic(&self) -> Result<Characteristic> {
        self.notify
            .ok_or_else(|| Error::Disconnected(format!("not connected to {}", self.address)))
    }
}

impl<L: Link> Reconnect for ConnectionManager<L> {
    fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        if self.state == ConnectionState::Connected {
            warn!("Link to {} dropped, reconnecting", self.address);
            self.reset();
        }
        self.connect(self.require_notifications)
    }
}

impl<L: Link> DirectRead for ConnectionManager<L> {
    fn is_link_up(&self) -> bool {
        self.link.is_connected()
    }

    fn read_direct(&mut self) -> Result<Vec<u8>> {
        self.read_notify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SimulatedBreezer;
    use crate::model::DeviceModel;
    use crate::notify::NotificationListener;

    const ADDRESS: &str = "FF:22:F3:1E:F3:A6";

    fn manager(link: SimulatedBreezer) -> (ConnectionManager<SimulatedBreezer>, NotificationListener) {
        let listener = NotificationListener::new(4, Duration::from_millis(10), 2);
        let profile = DeviceModel::S3.profile();
        let manager = ConnectionManager::new(link, ADDRESS, profile.as_ref(), listener.sink())
            .with_reconnect_delay(Duration::from_millis(1));
        (manager, listener)
    }

    #[test]
    fn test_connect_enables_notifications() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let control = sim.control();
        let (mut manager, _listener) = manager(sim);

        manager.connect(true).unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(control.notifications_enabled());
        assert_eq!(control.connects(), 1);
    }

    #[test]
    fn test_connect_without_notifications() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let control = sim.control();
        let (mut manager, _listener) = manager(sim);

        manager.connect(false).unwrap();
        assert!(manager.is_connected());
        assert!(!control.notifications_enabled());
    }

    #[test]
    fn test_connect_retries_once_after_disconnect() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let control = sim.control();
        control.fail_next_connects(1);
        let (mut manager, _listener) = manager(sim);

        manager.connect(true).unwrap();
        assert!(manager.is_connected());
        assert_eq!(control.connects(), 2);
    }

    #[test]
    fn test_second_disconnect_is_fatal() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let control = sim.control();
        control.fail_next_connects(2);
        let (mut manager, _listener) = manager(sim);

        let err = manager.connect(true).unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(control.connects(), 2);

        // The next call starts with a fresh extra attempt
        manager.connect(true).unwrap();
        assert!(manager.is_connected());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let control = sim.control();
        let (mut manager, _listener) = manager(sim);

        manager.connect(true).unwrap();
        manager.connect(true).unwrap();
        assert_eq!(control.connects(), 1);
    }

    #[test]
    fn test_missing_characteristic_is_connection_error() {
        // An S3 simulator does not expose the Lite characteristics
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let listener = NotificationListener::new(4, Duration::from_millis(10), 2);
        let profile = DeviceModel::Lite.profile();
        let mut manager = ConnectionManager::new(sim, ADDRESS, profile.as_ref(), listener.sink());

        let err = manager.connect(true).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let (mut manager, _listener) = manager(sim);

        manager.disconnect().unwrap();
        manager.connect(true).unwrap();
        manager.disconnect().unwrap();
        manager.disconnect().unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_ensure_connected_detects_link_drop() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let control = sim.control();
        let (mut manager, _listener) = manager(sim);

        manager.connect(true).unwrap();
        control.drop_link();
        assert!(!manager.is_connected());

        manager.ensure_connected().unwrap();
        assert!(manager.is_connected());
        assert_eq!(control.connects(), 2);
        assert!(control.notifications_enabled());
    }

    #[test]
    fn test_write_requires_connection() {
        let sim = SimulatedBreezer::new(DeviceModel::S3);
        let (mut manager, _listener) = manager(sim);

        let err = manager.write_frame(&CommandFrame::request()).unwrap_err();
        assert!(err.is_disconnect());
    }
}
