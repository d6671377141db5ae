//! Link abstraction for the short-range wireless connection.
//!
//! This module provides a `Link` trait that abstracts over the platform
//! Bluetooth LE stack, so the protocol layer never touches it directly:
//!
//! - **Simulated**: an in-process breezer for tests and dry runs
//! - **Native BLE**: `btleplug`-backed link (feature `ble`)
//!
//! ```text
//! +----------------------+
//! |  DeviceStateClient   |
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+      notifications      +----------------------+
//! |  ConnectionManager   |  ------------------->   | NotificationListener |
//! +----------+-----------+   (NotificationSink)    +----------------------+
//!            |
//!            v
//! +----------+-----------+
//! |      Link trait      |
//! +----------+-----------+
//!      |            |
//!  Simulated     BleLink
//! ```

#[cfg(feature = "ble")]
pub mod ble;
pub mod sim;

use crate::error::{Error, Result};
use log::warn;
use std::sync::mpsc::{SyncSender, TrySendError};
use uuid::Uuid;

/// Value written to a CCCD to enable notifications.
pub const CCCD_ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// A GATT characteristic as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Attribute handle of the characteristic value.
    pub handle: u16,
}

impl Characteristic {
    /// Handle of the client characteristic configuration descriptor.
    ///
    /// Fails for a characteristic on the last handle, which has no room
    /// for a descriptor.
    pub fn cccd_handle(&self) -> Result<u16> {
        self.handle.checked_add(1).ok_or_else(|| {
            Error::Connection(format!(
                "characteristic {} on handle {:#06x} has no CCCD",
                self.uuid, self.handle
            ))
        })
    }
}

/// Producer side of the notification queue.
///
/// The link delivers every notified frame here, from whatever thread its
/// stack calls back on.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: SyncSender<Vec<u8>>,
}

impl NotificationSink {
    pub(crate) fn new(tx: SyncSender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Queue one notified frame. Frames are dropped when the queue is full.
    pub fn deliver(&self, frame: Vec<u8>) {
        match self.tx.try_send(frame) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => warn!("Notification queue full, dropping frame"),
            Err(TrySendError::Disconnected(_)) => {},
        }
    }
}

/// Unified link trait for breezer communication.
///
/// Implementations report a dropped connection as
/// [`Error::Disconnected`](crate::Error::Disconnected) so the connection
/// policy can tell it apart from other failures.
pub trait Link: Send {
    /// Open the link to the device at `address`.
    fn connect(&mut self, address: &str) -> Result<()>;

    /// Tear the link down. Must succeed when already disconnected.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// List the characteristics exposed by the connected device.
    fn characteristics(&mut self) -> Result<Vec<Characteristic>>;

    /// Write to an attribute handle.
    fn write(&mut self, handle: u16, data: &[u8], with_response: bool) -> Result<()>;

    /// Read an attribute handle directly.
    fn read(&mut self, handle: u16) -> Result<Vec<u8>>;

    /// Route notifications from the device into `sink`.
    fn bind_notifications(&mut self, sink: NotificationSink) -> Result<()>;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn connect(&mut self, address: &str) -> Result<()> {
        (**self).connect(address)
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn characteristics(&mut self) -> Result<Vec<Characteristic>> {
        (**self).characteristics()
    }

    fn write(&mut self, handle: u16, data: &[u8], with_response: bool) -> Result<()> {
        (**self).write(handle, data, with_response)
    }

    fn read(&mut self, handle: u16) -> Result<Vec<u8>> {
        (**self).read(handle)
    }

    fn bind_notifications(&mut self, sink: NotificationSink) -> Result<()> {
        (**self).bind_notifications(sink)
    }
}

// Re-export the available implementations
#[cfg(feature = "ble")]
pub use ble::BleLink;
pub use sim::{SimControl, SimulatedBreezer};
