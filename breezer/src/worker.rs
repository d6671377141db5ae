//! Single-worker queue for one breezer.
//!
//! The link allows one operation in flight. [`DeviceWorker`] owns the client
//! on a dedicated thread and runs queued calls strictly one after another, so
//! any number of callers can share one device through `&DeviceWorker`.

use crate::client::Breezer;
use crate::error::{Error, Result};
use crate::model::DeviceModel;
use crate::state::{DeviceState, StateChanges};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Reply<T> = Sender<Result<T>>;

enum Job {
    Connect(Reply<()>),
    Disconnect(Reply<()>),
    Get { keep_open: bool, reply: Reply<DeviceState> },
    Set { changes: StateChanges, reply: Reply<DeviceState> },
    Pair(Reply<()>),
}

/// Owner of one [`Breezer`] running on its own thread.
pub struct DeviceWorker {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    model: DeviceModel,
    address: String,
    reply_timeout: Option<Duration>,
    abandoned: AtomicBool,
}

impl DeviceWorker {
    /// Move `client` onto a new worker thread.
    pub fn spawn(client: Box<dyn Breezer>) -> Result<Self> {
        let model = client.model();
        let address = client.address().to_string();
        let (tx, rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(format!("breezer-{address}"))
            .spawn(move || run(client, &rx))
            .map_err(|e| Error::Connection(format!("failed to start worker thread: {e}")))?;

        debug!("Started worker for {model} at {address}");
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            model,
            address,
            reply_timeout: None,
            abandoned: AtomicBool::new(false),
        })
    }

    /// Give up waiting for a reply after `timeout`.
    ///
    /// The call keeps running on the worker; only the caller stops waiting.
    /// Once a call has been abandoned, dropping the worker no longer waits
    /// for the thread to finish.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Model of the device.
    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// Device address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Queue a connect.
    pub fn connect(&self) -> Result<()> {
        self.call(Job::Connect)
    }

    /// Queue a disconnect.
    pub fn disconnect(&self) -> Result<()> {
        self.call(Job::Disconnect)
    }

    /// Queue a state read.
    pub fn get(&self, keep_open: bool) -> Result<DeviceState> {
        self.call(|reply| Job::Get { keep_open, reply })
    }

    /// Queue a read-merge-write.
    pub fn set(&self, changes: StateChanges) -> Result<DeviceState> {
        self.call(|reply| Job::Set { changes, reply })
    }

    /// Queue a pair.
    pub fn pair(&self) -> Result<()> {
        self.call(Job::Pair)
    }

    fn call<T>(&self, job: impl FnOnce(Reply<T>) -> Job) -> Result<T> {
        let tx = self.tx.as_ref().ok_or(Error::WorkerStopped)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(job(reply_tx)).map_err(|_| Error::WorkerStopped)?;

        match self.reply_timeout {
            Some(timeout) => match reply_rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => {
                    self.abandoned.store(true, Ordering::Relaxed);
                    Err(Error::Timeout(format!(
                        "no reply from {} within {timeout:?}",
                        self.address
                    )))
                },
                Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerStopped),
            },
            None => reply_rx.recv().map_err(|_| Error::WorkerStopped)?,
        }
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop after in-flight work
        self.tx.take();
        if self.abandoned.load(Ordering::Relaxed) {
            debug!("Detaching worker for {} with a call still running", self.address);
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker for {} panicked", self.address);
            }
        }
    }
}

fn run(mut client: Box<dyn Breezer>, rx: &Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        // A caller that timed out has dropped its receiver; ignore send errors
        match job {
            Job::Connect(reply) => {
                trace!("Worker: connect");
                let _ = reply.send(client.connect());
            },
            Job::Disconnect(reply) => {
                trace!("Worker: disconnect");
                let _ = reply.send(client.disconnect());
            },
            Job::Get { keep_open, reply } => {
                trace!("Worker: get (keep_open={keep_open})");
                let _ = reply.send(client.get(keep_open));
            },
            Job::Set { changes, reply } => {
                trace!("Worker: set {changes:?}");
                let _ = reply.send(client.set(&changes));
            },
            Job::Pair(reply) => {
                trace!("Worker: pair");
                let _ = reply.send(client.pair());
            },
        }
    }

    debug!("Worker for {} stopping", client.address());
    if let Err(e) = client.disconnect() {
        debug!("Disconnect on worker shutdown failed: {e}");
    }
}
