//! Bounded retry around link operations.
//!
//! Every step of a read or write cycle runs through [`RetryPolicy::run`].
//! Before each attempt the connection is re-established, unless the step is
//! the connect itself. When every attempt fails the last error is wrapped in
//! [`Error::MaxTriesExceeded`] naming the step.

use crate::config::{ClientConfig, DEFAULT_MAX_TRIES};
use crate::error::{Error, Result};
use log::{debug, warn};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Steps wrapped by the retry policy, named in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Open the link and enable notifications.
    Connect,
    /// Read the notify characteristic once to clear stale data.
    ClearNotify,
    /// Write a REQUEST_PARAMS frame.
    WriteRequest,
    /// Wait for the response frame.
    AwaitResponse,
    /// Write a SET_PARAMS frame.
    WriteSet,
    /// Write a PAIR frame.
    Pair,
}

impl Operation {
    /// Whether this step establishes the connection itself.
    pub fn performs_connect(self) -> bool {
        self == Self::Connect
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::ClearNotify => "clear-notify",
            Self::WriteRequest => "write-request",
            Self::AwaitResponse => "await-response",
            Self::WriteSet => "write-set",
            Self::Pair => "pair",
        };
        f.write_str(name)
    }
}

/// Something that can bring its connection back before an attempt.
pub trait Reconnect {
    /// Make sure the link is up, reconnecting if it dropped.
    fn ensure_connected(&mut self) -> Result<()>;
}

/// Bounded retry wrapper. Stateless; one value can serve any number of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_tries: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRIES)
    }
}

impl RetryPolicy {
    /// Policy making up to `max_tries` attempts (at least one).
    pub fn new(max_tries: u32) -> Self {
        Self {
            max_tries: max_tries.max(1),
            delay: Duration::ZERO,
        }
    }

    /// Policy from client settings.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_tries).with_delay(config.retry_delay)
    }

    /// Pause between failed attempts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Maximum number of attempts.
    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Run `action` against `target` until it succeeds or the budget is spent.
    pub fn run<C, T, F>(&self, operation: Operation, target: &mut C, mut action: F) -> Result<T>
    where
        C: Reconnect + ?Sized,
        F: FnMut(&mut C) -> Result<T>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_tries {
            let result = if operation.performs_connect() {
                action(target)
            } else {
                target.ensure_connected().and_then(|()| action(target))
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{operation} succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                },
                Err(e) => {
                    warn!(
                        "{operation} failed (attempt {attempt}/{}): {e}",
                        self.max_tries
                    );
                    last_error = Some(e);

                    if attempt < self.max_tries && !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                },
            }
        }

        Err(Error::MaxTriesExceeded {
            operation,
            tries: self.max_tries,
            source: Box::new(
                last_error.unwrap_or_else(|| Error::Connection("no attempt was made".into())),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingTarget {
        reconnects: u32,
        fail_reconnect: bool,
    }

    impl Reconnect for CountingTarget {
        fn ensure_connected(&mut self) -> Result<()> {
            self.reconnects += 1;
            if self.fail_reconnect {
                Err(Error::Disconnected("still down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_always_failing_action_runs_max_tries() {
        let policy = RetryPolicy::new(3);
        let mut target = CountingTarget::default();
        let mut calls = 0;

        let err = policy
            .run(Operation::WriteRequest, &mut target, |_| -> Result<()> {
                calls += 1;
                Err(Error::Disconnected("boom".into()))
            })
            .unwrap_err();

        assert_eq!(calls, 3);
        match err {
            Error::MaxTriesExceeded {
                operation,
                tries,
                source,
            } => {
                assert_eq!(operation, Operation::WriteRequest);
                assert_eq!(tries, 3);
                assert!(source.is_disconnect());
            },
            other => panic!("expected MaxTriesExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_reconnects_before_each_attempt() {
        let policy = RetryPolicy::new(3);
        let mut target = CountingTarget::default();
        let mut calls = 0;

        let value = policy
            .run(Operation::AwaitResponse, &mut target, |_| {
                calls += 1;
                if calls < 2 {
                    Err(Error::Timeout("nothing".into()))
                } else {
                    Ok(42)
                }
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls, 2);
        assert_eq!(target.reconnects, 2);
    }

    #[test]
    fn test_connect_step_does_not_reconnect_first() {
        let policy = RetryPolicy::new(2);
        let mut target = CountingTarget::default();

        policy
            .run(Operation::Connect, &mut target, |_| Ok(()))
            .unwrap();
        assert_eq!(target.reconnects, 0);
    }

    #[test]
    fn test_failed_reconnect_counts_as_attempt() {
        let policy = RetryPolicy::new(2);
        let mut target = CountingTarget {
            fail_reconnect: true,
            ..Default::default()
        };
        let mut calls = 0;

        let err = policy
            .run(Operation::ClearNotify, &mut target, |_| {
                calls += 1;
                Ok(())
            })
            .unwrap_err();

        assert!(err.is_max_tries_exceeded());
        assert_eq!(calls, 0);
        assert_eq!(target.reconnects, 2);
    }

    #[test]
    fn test_zero_tries_means_one() {
        assert_eq!(RetryPolicy::new(0).max_tries(), 1);
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Connect.to_string(), "connect");
        assert_eq!(Operation::ClearNotify.to_string(), "clear-notify");
        assert_eq!(Operation::AwaitResponse.to_string(), "await-response");
        assert_eq!(Operation::WriteSet.to_string(), "write-set");
    }
}
