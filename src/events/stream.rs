use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{SessionError, TrainingError, TrainingResult};

use super::bus::ObserverId;
use super::types::TrainingEvent;

/// A subscription stream for training events.
///
/// Dropping the stream unregisters it on the next publish.
#[derive(Debug)]
pub struct EventStream {
    observer_id: ObserverId,
    rx: Receiver<TrainingEvent>,
}

impl EventStream {
    pub(crate) fn new(observer_id: ObserverId, rx: Receiver<TrainingEvent>) -> Self {
        Self { observer_id, rx }
    }

    /// The registration backing this stream.
    #[must_use]
    pub const fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> TrainingResult<TrainingEvent> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> TrainingResult<TrainingEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TrainingError::Session(SessionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Receive an event if one is queued.
    pub fn try_recv(&self) -> TrainingResult<Option<TrainingEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Takes every queued event without blocking.
    #[must_use]
    pub fn drain(&self) -> Vec<TrainingEvent> {
        self.rx.try_iter().collect()
    }
}

fn disconnected() -> TrainingError {
    TrainingError::Session(SessionError::Disconnected {
        path: "event_stream".to_string(),
    })
}
