//! Device state client.
//!
//! [`DeviceStateClient`] sequences connect, request, wait and decode into the
//! `get`/`set`/`pair` cycles, running each step through the retry policy.
//! The [`Breezer`] trait is its object-safe face, used by
//! [`DeviceModel::create_client_with_link`](crate::DeviceModel::create_client_with_link)
//! and the [`DeviceWorker`](crate::DeviceWorker).

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{Error, Result};
use crate::link::Link;
use crate::model::{DeviceModel, DeviceProfile};
use crate::notify::NotificationListener;
use crate::protocol::{CommandFrame, decode};
use crate::retry::{Operation, RetryPolicy};
use crate::state::{DeviceState, StateChanges};
use log::{debug, info, warn};

/// Operations a breezer client offers.
pub trait Breezer: Send {
    /// Model of the device.
    fn model(&self) -> DeviceModel;

    /// Device address.
    fn address(&self) -> &str;

    /// Connect and enable notifications.
    fn connect(&mut self) -> Result<()>;

    /// Disconnect. Safe to call when already disconnected.
    fn disconnect(&mut self) -> Result<()>;

    /// Read the current state, disconnecting afterwards unless `keep_open`.
    fn get(&mut self, keep_open: bool) -> Result<DeviceState>;

    /// Apply `changes` on top of the current state and return the state the
    /// device reports afterwards.
    fn set(&mut self, changes: &StateChanges) -> Result<DeviceState>;

    /// Associate with the device.
    fn pair(&mut self) -> Result<()>;
}

/// Client for one physical breezer.
pub struct DeviceStateClient<L: Link> {
    connection: ConnectionManager<L>,
    listener: NotificationListener,
    profile: Box<dyn DeviceProfile>,
    retry: RetryPolicy,
}

impl<L: Link> DeviceStateClient<L> {
    /// Create a client with default settings.
    pub fn new(link: L, address: &str, profile: Box<dyn DeviceProfile>) -> Self {
        Self::with_config(link, address, profile, ClientConfig::default())
    }

    /// Create a client with explicit retry and polling settings.
    pub fn with_config(
        link: L,
        address: &str,
        profile: Box<dyn DeviceProfile>,
        config: ClientConfig,
    ) -> Self {
        let listener = NotificationListener::from_config(&config);
        let connection = ConnectionManager::new(link, address, profile.as_ref(), listener.sink())
            .with_reconnect_delay(config.reconnect_delay);

        Self {
            connection,
            listener,
            profile,
            retry: RetryPolicy::from_config(&config),
        }
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Connect and enable notifications.
    pub fn connect(&mut self) -> Result<()> {
        self.connect_with(true)
    }

    fn connect_with(&mut self, require_notifications: bool) -> Result<()> {
        self.retry
            .run(Operation::Connect, &mut self.connection, |conn| {
                conn.connect(require_notifications)
            })
    }

    /// Disconnect from the device.
    pub fn disconnect(&mut self) -> Result<()> {
        self.connection.disconnect()
    }

    fn disconnect_quietly(&mut self) {
        if let Err(e) = self.connection.disconnect() {
            warn!("Failed to disconnect from {}: {e}", self.connection.address());
        }
    }

    /// Read the current state.
    ///
    /// The link is closed afterwards unless `keep_open` is set, also when a
    /// later step fails. A failed connect leaves nothing to close.
    pub fn get(&mut self, keep_open: bool) -> Result<DeviceState> {
        self.connect()?;

        let result = self.read_state();
        if !keep_open {
            self.disconnect_quietly();
        }
        result
    }

    fn read_state(&mut self) -> Result<DeviceState> {
        let retry = self.retry;
        let listener = &self.listener;

        retry.run(Operation::ClearNotify, &mut self.connection, |conn| {
            conn.read_notify()?;
            let dropped = listener.clear();
            if dropped > 0 {
                debug!("Dropped {dropped} stale notifications");
            }
            Ok(())
        })?;

        let request = CommandFrame::request();
        retry.run(Operation::WriteRequest, &mut self.connection, |conn| {
            conn.write_frame(&request)
        })?;

        let response = retry.run(Operation::AwaitResponse, &mut self.connection, |conn| {
            listener.await_frame(conn)
        })?;

        let mut state = decode(&response, self.profile.as_ref())?;
        state.update_heating();
        debug!(
            "{} state: power={} heater={} heating={} mode={} fan={} target={} in={} out={}",
            self.profile.model(),
            state.power,
            state.heater_on,
            state.heating_active,
            state.air_mode,
            state.fan_speed,
            state.target_temp,
            state.in_temp,
            state.out_temp
        );
        Ok(state)
    }

    /// Apply `changes` with a read-merge-write cycle.
    ///
    /// The device only accepts complete parameter sets, so the current state
    /// is read first and every field not named in `changes` is written back
    /// unchanged. The returned state is a fresh read after the write. The
    /// link is closed afterwards.
    pub fn set(&mut self, changes: &StateChanges) -> Result<DeviceState> {
        if let Some(mode) = changes.air_mode {
            if !self.profile.supports_air_mode(mode) {
                return Err(Error::Unsupported(format!(
                    "{} does not support {mode} air mode",
                    self.profile.model()
                )));
            }
        }

        let result = self.write_changes(changes);
        self.disconnect_quietly();
        result
    }

    fn write_changes(&mut self, changes: &StateChanges) -> Result<DeviceState> {
        let current = self.get(true)?;
        let merged = current.merged(changes);
        let frame = CommandFrame::set_params(&merged);

        debug!("Writing merged state {changes:?}");
        self.retry
            .run(Operation::WriteSet, &mut self.connection, |conn| {
                conn.write_frame(&frame)
            })?;

        let confirmed = self.get(true)?;
        if !applied(&merged, &confirmed) {
            warn!("Breezer did not apply every requested change");
        }
        Ok(confirmed)
    }

    /// Send PAIR, then validate the association with a full read.
    pub fn pair(&mut self) -> Result<()> {
        self.connect_with(false)?;

        let frame = CommandFrame::pair();
        let written = self
            .retry
            .run(Operation::Pair, &mut self.connection, |conn| {
                conn.write_frame(&frame)
            });
        self.disconnect_quietly();
        written?;

        debug!("Pair frame sent, validating with a read");
        self.get(false)?;
        info!("Paired with {}", self.connection.address());
        Ok(())
    }
}

fn applied(wanted: &DeviceState, actual: &DeviceState) -> bool {
    wanted.power == actual.power
        && wanted.heater_on == actual.heater_on
        && wanted.sound_on == actual.sound_on
        && wanted.air_mode == actual.air_mode
        && wanted.fan_speed == actual.fan_speed
        && wanted.target_temp == actual.target_temp
}

impl<L: Link> Breezer for DeviceStateClient<L> {
    fn model(&self) -> DeviceModel {
        self.profile.model()
    }

    fn address(&self) -> &str {
        self.connection.address()
    }

    fn connect(&mut self) -> Result<()> {
        DeviceStateClient::connect(self)
    }

    fn disconnect(&mut self) -> Result<()> {
        DeviceStateClient::disconnect(self)
    }

    fn get(&mut self, keep_open: bool) -> Result<DeviceState> {
        DeviceStateClient::get(self, keep_open)
    }

    fn set(&mut self, changes: &StateChanges) -> Result<DeviceState> {
        DeviceStateClient::set(self, changes)
    }

    fn pair(&mut self) -> Result<()> {
        DeviceStateClient::pair(self)
    }
}
