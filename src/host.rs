//! Serialized session host.
//!
//! A [`VolumeOrchestrator`] has no internal locking. `SessionHost` moves it
//! onto a dedicated worker thread fed by a bounded command queue, so any
//! number of threads can drive one session while every operation still runs
//! strictly in arrival order.

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::{SessionError, TrainingError, TrainingResult};
use crate::notify::Notification;
use crate::volume::VolumeOrchestrator;

type Job = Box<dyn FnOnce(&mut VolumeOrchestrator) + Send>;

const QUEUE_PATH: &str = "session_host";

/// Owns a session on a worker thread and serializes calls into it.
pub struct SessionHost {
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<VolumeOrchestrator>>,
    queue_capacity: usize,
}

impl fmt::Debug for SessionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHost")
            .field("queue_capacity", &self.queue_capacity)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

/// Handle to the reply of a queued [`SessionHost::submit`].
#[derive(Debug)]
pub struct CallHandle<R> {
    rx: Receiver<R>,
}

impl<R> CallHandle<R> {
    /// Waits for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] if the worker is gone.
    pub fn join(self) -> TrainingResult<R> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Waits for the reply with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] when no reply arrives in time and
    /// [`SessionError::Disconnected`] if the worker is gone.
    pub fn join_timeout(self, timeout: Duration) -> TrainingResult<R> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TrainingError::Session(SessionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }
}

impl SessionHost {
    /// Moves `volume` onto a new worker thread. The queue bound comes from
    /// the session's `host_queue_capacity` setting.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the thread cannot be spawned.
    pub fn spawn(volume: VolumeOrchestrator) -> TrainingResult<Self> {
        let queue_capacity = volume.settings().host_queue_capacity.max(1);
        let name = format!("trainflow-session-{}", volume.session_id().simple());
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let mut volume = volume;
                while let Ok(job) = rx.recv() {
                    job(&mut volume);
                }
                debug!(session = %volume.session_id(), "session host stopped");
                volume
            })
            .map_err(|e| TrainingError::internal(format!("spawn session worker: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            queue_capacity,
        })
    }

    /// Queues `f` and returns a handle to its result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::QueueFull`] when the queue is at capacity and
    /// [`SessionError::Disconnected`] if the worker has stopped.
    pub fn submit<F, R>(&self, f: F) -> TrainingResult<CallHandle<R>>
    where
        F: FnOnce(&mut VolumeOrchestrator) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = bounded::<R>(1);
        self.enqueue(Box::new(move |volume| {
            let _ = reply.send(f(volume));
        }))?;
        Ok(CallHandle { rx })
    }

    /// Runs `f` on the session and waits for its result.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub fn call<F, R>(&self, f: F) -> TrainingResult<R>
    where
        F: FnOnce(&mut VolumeOrchestrator) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(f)?.join()
    }

    /// Queues a notification without waiting for it to be applied.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub fn notify(&self, notification: Notification) -> TrainingResult<()> {
        let kind = notification.label();
        self.enqueue(Box::new(move |volume| volume.apply(&notification)))
            .map_err(|err| {
                warn!(kind, %err, "notification not queued");
                err
            })
    }

    /// Maximum number of queued commands.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Stops the worker after it drains the queue and returns the session.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the worker panicked.
    pub fn into_inner(mut self) -> TrainingResult<VolumeOrchestrator> {
        drop(self.tx.take());
        let worker = self
            .worker
            .take()
            .ok_or_else(|| TrainingError::internal("session worker already joined"))?;
        worker
            .join()
            .map_err(|_| TrainingError::internal("session worker panicked"))
    }

    fn enqueue(&self, job: Job) -> TrainingResult<()> {
        let tx = self.tx.as_ref().ok_or_else(disconnected)?;
        tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => TrainingError::Session(SessionError::QueueFull {
                capacity: self.queue_capacity,
            }),
            TrySendError::Disconnected(_) => disconnected(),
        })
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued jobs and exit.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn disconnected() -> TrainingError {
    TrainingError::Session(SessionError::Disconnected {
        path: QUEUE_PATH.to_string(),
    })
}
