//! Event bus.
//!
//! Owns observer registrations for one session. Callbacks run inline;
//! channel subscribers receive clones through a bounded channel using
//! non-blocking `try_send`, so a slow consumer never stalls the engine.

use std::fmt;

use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use super::stream::EventStream;
use super::types::TrainingEvent;

/// Identifies one registration on an [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(u64);

/// Callback observer.
pub type Observer = Box<dyn FnMut(&TrainingEvent) + Send>;

enum Sink {
    Callback(Observer),
    Channel(Sender<TrainingEvent>),
}

/// Observer registry with deterministic, registration-ordered delivery.
#[derive(Default)]
pub struct EventBus {
    sinks: Vec<(ObserverId, Sink)>,
    next_id: u64,
    dropped_events: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.sinks.len())
            .field("dropped_events", &self.dropped_events)
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers a callback observer.
    pub fn subscribe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&TrainingEvent) + Send + 'static,
    {
        let id = self.allocate();
        self.sinks.push((id, Sink::Callback(Box::new(callback))));
        id
    }

    /// Registers a channel subscriber buffering up to `capacity` events.
    pub fn subscribe_stream(&mut self, capacity: usize) -> EventStream {
        let id = self.allocate();
        let (tx, rx) = bounded::<TrainingEvent>(capacity.max(1));
        self.sinks.push((id, Sink::Channel(tx)));
        EventStream::new(id, rx)
    }

    /// Removes a registration. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sid, _)| *sid != id);
        self.sinks.len() != before
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Events dropped because a stream subscriber was full.
    #[must_use]
    pub const fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Delivers `event` to every observer in registration order.
    ///
    /// Streams whose receiver has been dropped are unregistered.
    pub fn publish(&mut self, event: &TrainingEvent) {
        let mut dropped = 0;
        self.sinks.retain_mut(|(_, sink)| match sink {
            Sink::Callback(callback) => {
                callback(event);
                true
            }
            Sink::Channel(tx) => match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        });
        self.dropped_events += dropped;
    }
}
