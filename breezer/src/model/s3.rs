//! Tion Breezer 3S.

use super::{DeviceModel, DeviceProfile, ModelFields};
use crate::error::Result;
use crate::protocol::frame::flags;
use crate::protocol::response::{FLAGS_OFFSET, bit_at, byte_at};
use crate::state::AirMode;
use uuid::{Uuid, uuid};

/// S3 GATT service.
pub const SERVICE_UUID: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");
/// S3 write characteristic.
pub const WRITE_UUID: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");
/// S3 notify characteristic.
pub const NOTIFY_UUID: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

const HOURS_OFFSET: usize = 11;
const MINUTES_OFFSET: usize = 12;
const PRODUCTIVITY_OFFSET: usize = 14;
const FIRMWARE_LOW_OFFSET: usize = 17;
const FIRMWARE_HIGH_OFFSET: usize = 18;

/// Profile for the Breezer 3S, the only model reporting timer, clock,
/// productivity and firmware version.
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Profile;

impl DeviceProfile for S3Profile {
    fn model(&self) -> DeviceModel {
        DeviceModel::S3
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

    fn supported_air_modes(&self) -> &'static [AirMode] {
        &[AirMode::Outside, AirMode::Mixed, AirMode::Recirculation]
    }

    fn decode_extras(&self, response: &[u8]) -> Result<ModelFields> {
        let hours = byte_at(response, HOURS_OFFSET)?;
        let minutes = byte_at(response, MINUTES_OFFSET)?;
        let firmware_high = byte_at(response, FIRMWARE_HIGH_OFFSET)?;
        let firmware_low = byte_at(response, FIRMWARE_LOW_OFFSET)?;

        Ok(ModelFields {
            timer: Some(bit_at(response, FLAGS_OFFSET, flags::TIMER)?),
            time_of_day: Some(format!("{hours:02}:{minutes:02}")),
            productivity: Some(byte_at(response, PRODUCTIVITY_OFFSET)?),
            firmware_version: Some(format!("{firmware_high:02x}{firmware_low:02x}")),
        })
    }
}
