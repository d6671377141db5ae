//! # breezer
//!
//! A client for Tion breezer ventilation units.
//!
//! Breezers are controlled over a short-range wireless link with fixed
//! 20-byte frames. This crate provides:
//!
//! - Frame encoding and response decoding, including the breezer's signed
//!   temperature encoding
//! - A connection manager with a connect-once-more policy on disconnects
//! - A bounded notification queue with a polling wait and direct-read fallback
//! - Bounded retries around every link step
//! - `get`/`set`/`pair` cycles with read-merge-write for partial updates
//! - A single-worker queue for sharing one device between callers
//!
//! ## Supported Models
//!
//! - Breezer 3S (`S3`), including timer, clock, productivity and firmware
//! - Breezer 4S (`S4`)
//! - Lite
//!
//! ## Features
//!
//! - `ble`: native Bluetooth LE link via `btleplug`
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use breezer::{ClientConfig, DeviceModel, SimulatedBreezer, StateChanges};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = DeviceModel::S3;
//!     let link = SimulatedBreezer::new(model);
//!     let mut breezer = model.create_client_with_link(link, "FF:22:F3:1E:F3:A6", ClientConfig::default());
//!
//!     let state = breezer.get(false)?;
//!     println!("fan speed {}, inside {} °C", state.fan_speed, state.in_temp);
//!
//!     // Only the fan speed changes; everything else is written back as read
//!     breezer.set(&StateChanges::new().with_fan_speed(4))?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod model;
pub mod notify;
pub mod protocol;
pub mod retry;
pub mod state;
pub mod worker;

// Re-exports for convenience
#[cfg(feature = "ble")]
pub use link::BleLink;
pub use {
    client::{Breezer, DeviceStateClient},
    config::ClientConfig,
    connection::{ConnectionManager, ConnectionState},
    error::{Error, Result},
    link::{Characteristic, Link, NotificationSink, SimControl, SimulatedBreezer},
    model::{DeviceModel, DeviceProfile, ModelFields},
    notify::NotificationListener,
    protocol::{CommandFrame, CommandType, decode, decode_signed_temperature},
    retry::{Operation, RetryPolicy},
    state::{AirMode, DeviceState, StateChanges, heating_active},
    worker::DeviceWorker,
};
