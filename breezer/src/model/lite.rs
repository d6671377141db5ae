//! Tion Lite.

use super::{DeviceModel, DeviceProfile};
use uuid::{Uuid, uuid};

/// Lite/4S GATT service.
pub const SERVICE_UUID: Uuid = uuid!("98f00001-3788-83ea-453e-f52244709ddb");
/// Lite/4S write characteristic.
pub const WRITE_UUID: Uuid = uuid!("98f00002-3788-83ea-453e-f52244709ddb");
/// Lite/4S notify characteristic.
pub const NOTIFY_UUID: Uuid = uuid!("98f00003-3788-83ea-453e-f52244709ddb");

/// Profile for the Tion Lite.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteProfile;

impl DeviceProfile for LiteProfile {
    fn model(&self) -> DeviceModel {
        DeviceModel::Lite
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
