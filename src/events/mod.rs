//! Outbound training events.
//!
//! The engine reports activations, completions, gate changes and trainee
//! mistakes as [`TrainingEvent`]s. Observers register with the session's
//! [`EventBus`] either as callbacks or as bounded channel streams; delivery
//! is synchronous and follows registration order.

/// Observer registration and delivery.
pub mod bus;
/// Subscriber stream handle.
pub mod stream;
/// Event type definitions.
pub mod types;

pub use bus::{EventBus, ObserverId};
pub use stream::EventStream;
pub use types::{MistakeSeverity, ResetReason, TrainingEvent};
