//! Bluetooth LE link backed by `btleplug`.
//!
//! `btleplug` is asynchronous; this link owns a small tokio runtime and
//! blocks on it so the rest of the crate stays synchronous. GATT
//! characteristics carry no stable attribute handles in `btleplug`, so the
//! link numbers them itself: characteristic `i` of the discovered list gets
//! handle `2i + 1` and its CCCD `2i + 2`.

use super::{CCCD_ENABLE_NOTIFICATIONS, Characteristic, Link, NotificationSink};
use crate::error::{Error, Result};
use btleplug::api::{
    Central, Characteristic as GattCharacteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use log::{debug, info, trace};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long to scan for the device before giving up.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A connected device.
struct Device {
    address: String,
    peripheral: Peripheral,
}

/// Native Bluetooth LE link.
pub struct BleLink {
    runtime: Runtime,
    adapter: Adapter,
    device: Option<Device>,
    characteristics: Vec<GattCharacteristic>,
    subscribed: Vec<Uuid>,
    forwarder: Option<JoinHandle<()>>,
    scan_timeout: Duration,
}

impl BleLink {
    /// Open the first Bluetooth adapter of the host.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("breezer-ble")
            .enable_all()
            .build()
            .map_err(|e| Error::Connection(format!("failed to start BLE runtime: {e}")))?;

        let adapter = runtime.block_on(async {
            let manager = Manager::new().await?;
            let adapters = manager.adapters().await?;
            adapters
                .into_iter()
                .next()
                .ok_or_else(|| Error::Connection("no Bluetooth adapter found".into()))
        })?;

        Ok(Self {
            runtime,
            adapter,
            device: None,
            characteristics: Vec::new(),
            subscribed: Vec::new(),
            forwarder: None,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        })
    }

    /// Set how long `connect` scans for the device.
    #[must_use]
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    fn peripheral(&self) -> Result<&Peripheral> {
        self.device
            .as_ref()
            .map(|d| &d.peripheral)
            .ok_or_else(|| Error::Disconnected("not connected".into()))
    }

    fn characteristic(&self, index: usize) -> Result<&GattCharacteristic> {
        self.characteristics
            .get(index)
            .ok_or_else(|| Error::Connection(format!("no characteristic at index {index}")))
    }

    /// Scan until a peripheral with `address` shows up.
    fn find(&self, address: &str) -> Result<Peripheral> {
        let adapter = &self.adapter;
        let timeout = self.scan_timeout;

        self.runtime.block_on(async {
            adapter.start_scan(ScanFilter::default()).await?;
            let started = Instant::now();

            let found = loop {
                let mut matched = None;
                for peripheral in adapter.peripherals().await? {
                    let id = peripheral.id().to_string();
                    let mac = peripheral.address().to_string();
                    if mac.eq_ignore_ascii_case(address) || id.eq_ignore_ascii_case(address) {
                        matched = Some(peripheral);
                        break;
                    }
                }

                if let Some(peripheral) = matched {
                    break Some(peripheral);
                }
                if started.elapsed() >= timeout {
                    break None;
                }
                tokio::time::sleep(SCAN_POLL_INTERVAL).await;
            };

            adapter.stop_scan().await?;
            found.ok_or_else(|| Error::from(btleplug::Error::DeviceNotFound))
        })
    }

    fn stop_forwarding(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Split a synthetic handle into a characteristic index and whether it
/// addresses the CCCD.
fn decode_handle(handle: u16) -> Result<(usize, bool)> {
    if handle == 0 {
        return Err(Error::Connection("handle 0 is invalid".into()));
    }
    let index = usize::from((handle - 1) / 2);
    Ok((index, handle % 2 == 0))
}

/// Value handle of characteristic `index`. Its CCCD handle must fit too.
fn encode_handle(index: usize) -> Result<u16> {
    index
        .checked_mul(2)
        .and_then(|h| h.checked_add(2))
        .and_then(|cccd| u16::try_from(cccd).ok())
        .map(|cccd| cccd - 1)
        .ok_or_else(|| Error::Connection(format!("too many characteristics ({index})")))
}

impl Link for BleLink {
    fn connect(&mut self, address: &str) -> Result<()> {
        let peripheral = match self.device.take() {
            Some(device) if device.address == address => device.peripheral,
            _ => self.find(address)?,
        };

        debug!("Connecting to {address}");
        self.runtime.block_on(async {
            if !peripheral.is_connected().await? {
                peripheral.connect().await?;
            }
            peripheral.discover_services().await?;
            Ok::<(), Error>(())
        })?;

        self.characteristics = peripheral.characteristics().into_iter().collect();
        self.subscribed.clear();
        info!(
            "BLE link to {address} up, {} characteristics",
            self.characteristics.len()
        );

        self.device = Some(Device {
            address: address.to_string(),
            peripheral,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.stop_forwarding();
        self.subscribed.clear();

        let Some(device) = &self.device else {
            return Ok(());
        };
        self.runtime.block_on(async {
            if device.peripheral.is_connected().await? {
                debug!("Disconnecting from {}", device.address);
                device.peripheral.disconnect().await?;
            }
            Ok::<(), Error>(())
        })
    }

    fn is_connected(&self) -> bool {
        self.device.as_ref().is_some_and(|device| {
            self.runtime
                .block_on(device.peripheral.is_connected())
                .unwrap_or(false)
        })
    }

    fn characteristics(&mut self) -> Result<Vec<Characteristic>> {
        self.peripheral()?;
        self.characteristics
            .iter()
            .enumerate()
            .map(|(index, c)| {
                Ok(Characteristic {
                    uuid: c.uuid,
                    handle: encode_handle(index)?,
                })
            })
            .collect()
    }

    fn write(&mut self, handle: u16, data: &[u8], with_response: bool) -> Result<()> {
        let (index, is_cccd) = decode_handle(handle)?;
        let peripheral = self.peripheral()?;
        let characteristic = self.characteristic(index)?;

        if is_cccd {
            let enable = data == CCCD_ENABLE_NOTIFICATIONS;
            trace!(
                "{} notifications on {}",
                if enable { "Enabling" } else { "Disabling" },
                characteristic.uuid
            );
            let uuid = characteristic.uuid;
            self.runtime.block_on(async {
                if enable {
                    peripheral.subscribe(characteristic).await
                } else {
                    peripheral.unsubscribe(characteristic).await
                }
            })?;
            if enable {
                self.subscribed.push(uuid);
            } else {
                self.subscribed.retain(|u| *u != uuid);
            }
            return Ok(());
        }

        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.runtime
            .block_on(peripheral.write(characteristic, data, write_type))?;
        Ok(())
    }

    fn read(&mut self, handle: u16) -> Result<Vec<u8>> {
        let (index, is_cccd) = decode_handle(handle)?;
        if is_cccd {
            return Err(Error::Connection(format!(
                "handle {handle:#06x} is not readable"
            )));
        }
        let peripheral = self.peripheral()?;
        let characteristic = self.characteristic(index)?;
        Ok(self.runtime.block_on(peripheral.read(characteristic))?)
    }

    fn bind_notifications(&mut self, sink: NotificationSink) -> Result<()> {
        self.stop_forwarding();

        let peripheral = self.peripheral()?.clone();
        let subscribed = self.subscribed.clone();
        let mut stream = self.runtime.block_on(peripheral.notifications())?;

        self.forwarder = Some(self.runtime.spawn(async move {
            while let Some(notification) = stream.next().await {
                if subscribed.contains(&notification.uuid) {
                    sink.deliver(notification.value);
                }
            }
            trace!("Notification stream ended");
        }));
        Ok(())
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        self.stop_forwarding();
    }
}
