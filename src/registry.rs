//! Object state registry.
//!
//! Maps each [`ObjectRef`] to its last known interaction facts. Entries are
//! upserted as environment adapters report events and are only removed by
//! [`ObjectStateRegistry::clear`] on session reset. Every upsert is O(1)
//! and idempotent; each returns whether anything observable changed so the
//! caller can skip re-evaluation.

use std::collections::{BTreeSet, HashMap};

use crate::object::{ObjectRef, ObjectState, Vec3};

/// Live interaction facts for every known object, socket and custom
/// predicate in a session.
#[derive(Debug, Default, Clone)]
pub struct ObjectStateRegistry {
    objects: HashMap<ObjectRef, ObjectState>,
    /// Socket point -> current occupant.
    sockets: HashMap<ObjectRef, Option<ObjectRef>>,
    custom: HashMap<String, bool>,
}

impl ObjectStateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `point` a known socket without changing its occupant.
    pub fn register_socket(&mut self, point: ObjectRef) -> bool {
        if self.sockets.contains_key(&point) {
            return false;
        }
        self.sockets.insert(point, None);
        true
    }

    /// Records `object` snapping into (or out of) `point`.
    ///
    /// A disconnect only clears facts that still refer to this pairing, so a
    /// late "unsnapped" for an object that already moved elsewhere is
    /// harmless.
    pub fn upsert_snap(&mut self, point: ObjectRef, object: ObjectRef, connected: bool) -> bool {
        let mut changed = self.register_socket(point);

        // An object can only sit in one socket; vacate the previous one.
        let previous = self.objects.get(&object).and_then(|s| s.snapped_to);
        if let Some(old) = previous.filter(|old| connected && *old != point) {
            if let Some(slot) = self.sockets.get_mut(&old).filter(|slot| **slot == Some(object)) {
                *slot = None;
                changed = true;
            }
        }

        // The socket holds one object; an evicted occupant is no longer
        // snapped here.
        let evicted = self.sockets.get(&point).copied().flatten();
        if let Some(other) = evicted.filter(|other| connected && *other != object) {
            if let Some(state) = self.objects.get_mut(&other).filter(|s| s.snapped_to == Some(point)) {
                state.snapped_to = None;
                changed = true;
            }
        }

        let occupant = self.sockets.entry(point).or_default();
        let state = self.objects.entry(object).or_default();

        if connected {
            if *occupant != Some(object) {
                *occupant = Some(object);
                changed = true;
            }
            if state.snapped_to != Some(point) {
                state.snapped_to = Some(point);
                changed = true;
            }
        } else {
            if *occupant == Some(object) {
                *occupant = None;
                changed = true;
            }
            if state.snapped_to == Some(point) {
                state.snapped_to = None;
                changed = true;
            }
        }
        changed
    }

    /// Records a grab-state change.
    pub fn upsert_grab(&mut self, object: ObjectRef, grabbed: bool) -> bool {
        let state = self.objects.entry(object).or_default();
        let changed = state.is_grabbed != grabbed;
        state.is_grabbed = grabbed;
        changed
    }

    /// Records a rotation update, in degrees.
    pub fn upsert_rotation(&mut self, object: ObjectRef, angle: f32) -> bool {
        let state = self.objects.entry(object).or_default();
        let changed = state.rotation_angle != Some(angle);
        state.rotation_angle = Some(angle);
        changed
    }

    /// Records a position update.
    pub fn upsert_position(&mut self, object: ObjectRef, position: Vec3) -> bool {
        let state = self.objects.entry(object).or_default();
        let changed = state.position != Some(position);
        state.position = Some(position);
        changed
    }

    /// Sets an externally evaluated predicate.
    pub fn set_custom(&mut self, predicate_id: impl Into<String>, value: bool) -> bool {
        let previous = self.custom.insert(predicate_id.into(), value);
        previous != Some(value)
    }

    /// Returns the state of `object`, or an empty state for unknown refs.
    #[must_use]
    pub fn get(&self, object: ObjectRef) -> ObjectState {
        self.objects.get(&object).cloned().unwrap_or_default()
    }

    /// Borrowing variant of [`Self::get`]; `None` means unknown.
    #[must_use]
    pub fn state(&self, object: ObjectRef) -> Option<&ObjectState> {
        self.objects.get(&object)
    }

    /// Returns the occupant of a known socket. Outer `None` means the point
    /// is not a known socket.
    #[must_use]
    pub fn socket_occupant(&self, point: ObjectRef) -> Option<Option<ObjectRef>> {
        self.sockets.get(&point).copied()
    }

    /// Returns true if `point` is a known socket.
    #[must_use]
    pub fn is_socket(&self, point: ObjectRef) -> bool {
        self.sockets.contains_key(&point)
    }

    /// All sockets known at this instant, in a stable order.
    #[must_use]
    pub fn known_sockets(&self) -> BTreeSet<ObjectRef> {
        self.sockets.keys().copied().collect()
    }

    /// Returns the value of a custom predicate; unknown ids are false.
    #[must_use]
    pub fn custom(&self, predicate_id: &str) -> bool {
        self.custom.get(predicate_id).copied().unwrap_or(false)
    }

    /// Number of objects with recorded facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.sockets.is_empty() && self.custom.is_empty()
    }

    /// Forgets everything. Only used when a session is reset.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.sockets.clear();
        self.custom.clear();
    }
}
