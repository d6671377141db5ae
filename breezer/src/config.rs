//! Client tuning parameters.

use std::time::Duration;

/// Default number of attempts per wrapped operation.
pub const DEFAULT_MAX_TRIES: u32 = 3;

/// Default wait for one notification poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of notification polls before falling back to a read.
pub const DEFAULT_MAX_POLLS: u32 = 10;

/// Default pause before the single extra connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Default capacity of the notification queue.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 16;

/// Retry, polling and queue settings for a [`DeviceStateClient`](crate::DeviceStateClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Attempts per wrapped operation.
    pub max_tries: u32,
    /// Pause between attempts of a wrapped operation.
    pub retry_delay: Duration,
    /// Wait for one notification poll.
    pub poll_interval: Duration,
    /// Notification polls before the fallback read.
    pub max_polls: u32,
    /// Pause before retrying a connect that hit a disconnect.
    pub reconnect_delay: Duration,
    /// Frames buffered between the link and the reader.
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            retry_delay: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts per operation (at least one).
    #[must_use]
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    /// Set the pause between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the notification polling budget.
    #[must_use]
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Set the pause before the extra connect attempt.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Longest time one response wait can block.
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval * self.max_polls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.max_tries, 3);
        assert_eq!(config.max_polls, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.poll_budget(), Duration::from_secs(10));
    }

    #[test]
    fn test_max_tries_at_least_one() {
        assert_eq!(ClientConfig::new().with_max_tries(0).max_tries, 1);
    }
}
