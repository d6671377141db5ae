//! Breezer model abstraction.
//!
//! All supported models speak the same 20-byte frame protocol but differ in
//! their GATT UUIDs, the air sources they support, and the extra fields they
//! report. Each model has a [`DeviceProfile`] implementation; the decoder
//! asks the active profile for model-specific fields.

mod lite;
mod s3;
mod s4;

pub use lite::LiteProfile;
pub use s3::S3Profile;
pub use s4::S4Profile;

use crate::client::{Breezer, DeviceStateClient};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::link::Link;
use crate::state::AirMode;
use std::fmt;
use uuid::Uuid;

/// Supported breezer models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceModel {
    /// Tion Breezer 3S.
    #[default]
    S3,
    /// Tion Breezer 4S.
    S4,
    /// Tion Lite.
    Lite,
}

impl DeviceModel {
    /// Get the model from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "s3" | "3s" => Some(Self::S3),
            "s4" | "4s" => Some(Self::S4),
            "lite" => Some(Self::Lite),
            _ => None,
        }
    }

    /// Create the profile for this model.
    pub fn profile(&self) -> Box<dyn DeviceProfile> {
        match self {
            Self::S3 => Box::new(S3Profile),
            Self::S4 => Box::new(S4Profile),
            Self::Lite => Box::new(LiteProfile),
        }
    }

    /// Create a client for this model over an existing link.
    ///
    /// This is useful for testing or custom link implementations.
    pub fn create_client_with_link<L: Link + 'static>(
        &self,
        link: L,
        address: &str,
        config: ClientConfig,
    ) -> Box<dyn Breezer> {
        Box::new(DeviceStateClient::with_config(
            link,
            address,
            self.profile(),
            config,
        ))
    }

    /// Create a client that talks to a real device over Bluetooth LE.
    #[cfg(feature = "ble")]
    pub fn create_client(&self, address: &str, config: ClientConfig) -> Result<Box<dyn Breezer>> {
        let link = crate::link::ble::BleLink::new()?;
        Ok(self.create_client_with_link(link, address, config))
    }
}

impl std::str::FromStr for DeviceModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::Unsupported(format!("Model '{s}' is not supported")))
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 => write!(f, "S3"),
            Self::S4 => write!(f, "S4"),
            Self::Lite => write!(f, "Lite"),
        }
    }
}

/// Fields only some models report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelFields {
    /// Timer active.
    pub timer: Option<bool>,
    /// Device clock as `HH:MM`.
    pub time_of_day: Option<String>,
    /// Productivity in m³/h.
    pub productivity: Option<u8>,
    /// Firmware version.
    pub firmware_version: Option<String>,
}

/// Per-model capabilities.
pub trait DeviceProfile: Send + Sync + fmt::Debug {
    /// The model this profile describes.
    fn model(&self) -> DeviceModel;

    /// GATT service UUID.
    fn service_uuid(&self) -> Uuid;

    /// Characteristic commands are written to.
    fn write_uuid(&self) -> Uuid;

    /// Characteristic responses are notified on.
    fn notify_uuid(&self) -> Uuid;

    /// Air sources this model can switch to.
    fn supported_air_modes(&self) -> &'static [AirMode] {
        &[AirMode::Outside, AirMode::Recirculation]
    }

    /// Check whether an air mode can be set on this model.
    fn supports_air_mode(&self, mode: AirMode) -> bool {
        self.supported_air_modes().contains(&mode)
    }

    /// Read model-specific fields from a response frame.
    fn decode_extras(&self, _response: &[u8]) -> Result<ModelFields> {
        // Default: the model reports nothing beyond the common fields
        Ok(ModelFields::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_name() {
        assert_eq!(DeviceModel::from_name("s3"), Some(DeviceModel::S3));
        assert_eq!(DeviceModel::from_name("LITE"), Some(DeviceModel::Lite));
        assert_eq!(DeviceModel::from_name("4s"), Some(DeviceModel::S4));
        assert_eq!(DeviceModel::from_name("o2"), None);
    }

    #[test]
    fn test_model_from_str_rejects_unknown() {
        assert!(matches!(
            "magicair".parse::<DeviceModel>(),
            Err(Error::Unsupported(_))
        ));
        assert_eq!("S3".parse::<DeviceModel>().unwrap(), DeviceModel::S3);
    }

    #[test]
    fn test_profile_matches_model() {
        for model in [DeviceModel::S3, DeviceModel::S4, DeviceModel::Lite] {
            assert_eq!(model.profile().model(), model);
        }
    }

    #[test]
    fn test_supported_air_modes() {
        let s3 = DeviceModel::S3.profile();
        assert!(s3.supports_air_mode(AirMode::Mixed));

        let lite = DeviceModel::Lite.profile();
        assert!(!lite.supports_air_mode(AirMode::Mixed));
        assert!(lite.supports_air_mode(AirMode::Recirculation));
    }

    #[test]
    fn test_uuids_distinct_per_family() {
        let s3 = DeviceModel::S3.profile();
        let s4 = DeviceModel::S4.profile();
        assert_ne!(s3.write_uuid(), s3.notify_uuid());
        assert_ne!(s3.service_uuid(), s4.service_uuid());
    }
}
