//! Error types for breezer.

use crate::retry::Operation;
use thiserror::Error;

/// Result type for breezer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for breezer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The link could not be opened or a required characteristic is missing.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The link dropped (or was never up) while an operation was in progress.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// A response frame did not match the expected layout.
    #[error("Protocol error: {reason} (index {index}, response {})", hex(.response))]
    Protocol {
        /// What went wrong.
        reason: String,
        /// Byte offset that could not be read.
        index: usize,
        /// The raw response as received.
        response: Vec<u8>,
    },

    /// A wrapped operation failed on every attempt.
    #[error("{operation} failed after {tries} tries: {source}")]
    MaxTriesExceeded {
        /// The operation that was retried.
        operation: Operation,
        /// Number of attempts made.
        tries: u32,
        /// The error from the last attempt.
        #[source]
        source: Box<Error>,
    },

    /// Timed out waiting for the device (or for the worker queue).
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Unsupported model or setting.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The worker thread that owns the client is gone.
    #[error("Device worker stopped")]
    WorkerStopped,
}

impl Error {
    /// Build a protocol error for a byte that could not be read.
    pub fn protocol(reason: impl Into<String>, index: usize, response: &[u8]) -> Self {
        Self::Protocol {
            reason: reason.into(),
            index,
            response: response.to_vec(),
        }
    }

    /// Whether this is a disconnect-class link error.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Whether a retried operation gave up.
    pub fn is_max_tries_exceeded(&self) -> bool {
        matches!(self, Self::MaxTriesExceeded { .. })
    }
}

#[cfg(feature = "ble")]
impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::NotConnected | btleplug::Error::DeviceNotFound => {
                Self::Disconnected(err.to_string())
            },
            btleplug::Error::TimedOut(_) => Self::Timeout(err.to_string()),
            other => Self::Connection(other.to_string()),
        }
    }
}

/// Hex dump used in error and log messages.
pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_message_carries_response() {
        let err = Error::protocol("response too short", 7, &[0x3d, 0x01, 0x0c]);
        let msg = err.to_string();
        assert!(msg.contains("index 7"));
        assert!(msg.contains("3d010c"));
    }

    #[test]
    fn test_max_tries_names_operation() {
        let err = Error::MaxTriesExceeded {
            operation: Operation::WriteRequest,
            tries: 3,
            source: Box::new(Error::Disconnected("gone".into())),
        };
        assert!(err.is_max_tries_exceeded());
        assert!(err.to_string().starts_with("write-request failed after 3 tries"));
    }

    #[test]
    fn test_is_disconnect() {
        assert!(Error::Disconnected("x".into()).is_disconnect());
        assert!(!Error::Connection("x".into()).is_disconnect());
    }
}
