//! Breezer wire protocol: 20-byte command and response frames.

pub mod frame;
pub mod response;

// Re-export common types
pub use frame::{CommandFrame, CommandType, FRAME_LEN, FRAME_PREFIX, FRAME_SUFFIX};
pub use response::{decode, decode_signed_temperature, encode_signed_temperature};
