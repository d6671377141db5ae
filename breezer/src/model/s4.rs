//! Tion Breezer 4S.

use super::lite::{NOTIFY_UUID, SERVICE_UUID, WRITE_UUID};
use super::{DeviceModel, DeviceProfile};
use uuid::Uuid;

/// Profile for the Breezer 4S. Shares its GATT layout with the Lite.
#[derive(Debug, Clone, Copy, Default)]
pub struct S4Profile;

impl DeviceProfile for S4Profile {
    fn model(&self) -> DeviceModel {
        DeviceModel::S4
    }

    fn service_uuid(&self) -> Uuid {
        SERVICE_UUID
    }

    fn write_uuid(&self) -> Uuid {
        WRITE_UUID
    }

    fn notify_uuid(&self) -> Uuid {
        NOTIFY_UUID
    }
}
