//! Notification buffering and the response wait loop.
//!
//! The link delivers response frames asynchronously from its own callback
//! context. They travel through a bounded channel to the reader, which polls
//! with a per-iteration timeout and falls back to a direct characteristic
//! read when nothing arrives.

use crate::config::ClientConfig;
use crate::error::{Error, Result, hex};
use crate::link::NotificationSink;
use crate::protocol::{FRAME_LEN, FRAME_PREFIX, FRAME_SUFFIX};
use log::{debug, trace};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::Duration;

/// Access the listener needs while it waits: link liveness and the
/// fallback read of the notify characteristic.
pub trait DirectRead {
    /// Whether the link is still up.
    fn is_link_up(&self) -> bool;

    /// Read the notify characteristic synchronously.
    fn read_direct(&mut self) -> Result<Vec<u8>>;
}

/// FIFO of frames pushed by the device.
#[derive(Debug)]
pub struct NotificationListener {
    tx: SyncSender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    poll_interval: Duration,
    max_polls: u32,
}

impl NotificationListener {
    /// Create a listener with the given queue capacity and polling budget.
    pub fn new(capacity: usize, poll_interval: Duration, max_polls: u32) -> Self {
        let (tx, rx) = sync_channel(capacity.max(1));
        Self {
            tx,
            rx,
            poll_interval,
            max_polls,
        }
    }

    /// Create a listener from client settings.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.notification_capacity,
            config.poll_interval,
            config.max_polls,
        )
    }

    /// Producer handle to hand to the link.
    pub fn sink(&self) -> NotificationSink {
        NotificationSink::new(self.tx.clone())
    }

    /// Take the oldest queued frame without waiting.
    pub fn try_next(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Drop every queued frame, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while let Some(frame) = self.try_next() {
            trace!("Dropping stale notification {}", hex(&frame));
            dropped += 1;
        }
        dropped
    }

    /// Wait for the next response frame.
    ///
    /// Polls up to `max_polls` times, each blocking up to `poll_interval`.
    /// If nothing arrives the notify characteristic is read directly as a
    /// last resort. A dropped link is reported immediately instead of being
    /// retried here.
    pub fn await_frame<S: DirectRead + ?Sized>(&self, source: &mut S) -> Result<Vec<u8>> {
        for poll in 1..=self.max_polls {
            if !source.is_link_up() {
                return Err(Error::Disconnected(
                    "link dropped while waiting for notification".into(),
                ));
            }

            match self.rx.recv_timeout(self.poll_interval) {
                Ok(frame) => {
                    trace!("Got notification {} after poll {poll}", hex(&frame));
                    return Ok(frame);
                },
                Err(RecvTimeoutError::Timeout) => {
                    trace!("No notification yet (poll {poll}/{})", self.max_polls);
                },
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Disconnected("notification queue closed".into()));
                },
            }
        }

        debug!("Waiting too long for data, reading notify characteristic directly");
        let direct = source.read_direct()?;

        // The read may itself have triggered a notification
        if let Some(frame) = self.try_next() {
            return Ok(frame);
        }

        if is_complete_frame(&direct) {
            debug!("Using directly read frame {}", hex(&direct));
            return Ok(direct);
        }

        Err(Error::Timeout(format!(
            "Could not get breezer state after {} polls",
            self.max_polls
        )))
    }
}

fn is_complete_frame(data: &[u8]) -> bool {
    data.len() == FRAME_LEN && data[0] == FRAME_PREFIX && data[FRAME_LEN - 1] == FRAME_SUFFIX
}
