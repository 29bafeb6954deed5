//! Completion conditions.
//!
//! A [`Condition`] is a pure predicate over the [`ObjectStateRegistry`].
//! Evaluation is total: a reference that cannot be satisfied (unknown
//! object, missing position, unresolved name) evaluates to `false` and
//! never fails.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::object::ObjectRef;
use crate::registry::ObjectStateRegistry;

/// Tolerance applied to rotation targets when none is authored.
pub const DEFAULT_ROTATION_TOLERANCE: f32 = 5.0;

/// A completion predicate.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// `target` is snapped, optionally into a specific counterpart.
    ObjectSnapped {
        target: ObjectRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_counterpart: Option<ObjectRef>,
    },

    /// Every listed point, and every socket known at evaluation time, is
    /// occupied.
    AllSnapped {
        #[serde(default)]
        required_points: BTreeSet<ObjectRef>,
    },

    /// `target` is currently held.
    Grabbed { target: ObjectRef },

    /// `target` is rotated to within `tolerance` of `target_value`.
    RotatedTo {
        target: ObjectRef,
        target_value: f32,
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },

    /// `a` and `b` are at most `max_distance` apart.
    Proximity {
        a: ObjectRef,
        b: ObjectRef,
        max_distance: f32,
    },

    /// An externally evaluated predicate.
    Custom { predicate_id: String },

    /// A name-based reference that failed to resolve at load time.
    Unresolved { reference: String },
}

fn default_tolerance() -> f32 {
    DEFAULT_ROTATION_TOLERANCE
}

impl Condition {
    /// Evaluates this condition against current registry facts.
    #[must_use]
    pub fn evaluate(&self, registry: &ObjectStateRegistry) -> bool {
        match self {
            Self::ObjectSnapped {
                target,
                expected_counterpart,
            } => eval_snapped(registry, *target, *expected_counterpart),

            Self::AllSnapped { required_points } => eval_all_snapped(registry, required_points),

            Self::Grabbed { target } => registry.state(*target).is_some_and(|s| s.is_grabbed),

            Self::RotatedTo {
                target,
                target_value,
                tolerance,
            } => registry
                .state(*target)
                .and_then(|s| s.rotation_angle)
                .is_some_and(|angle| (angle - target_value).abs() <= *tolerance),

            Self::Proximity { a, b, max_distance } => {
                let pa = registry.state(*a).and_then(|s| s.position);
                let pb = registry.state(*b).and_then(|s| s.position);
                match (pa, pb) {
                    (Some(pa), Some(pb)) => pa.distance(&pb) <= *max_distance,
                    _ => false,
                }
            }

            Self::Custom { predicate_id } => registry.custom(predicate_id),

            Self::Unresolved { .. } => false,
        }
    }

    /// Objects whose facts can change the outcome of this condition.
    ///
    /// `AllSnapped` also depends on the dynamic socket set; see
    /// [`Self::watches_all_sockets`].
    #[must_use]
    pub fn referenced_objects(&self) -> Vec<ObjectRef> {
        match self {
            Self::ObjectSnapped {
                target,
                expected_counterpart,
            } => {
                let mut out = vec![*target];
                out.extend(expected_counterpart.iter().copied());
                out
            }
            Self::AllSnapped { required_points } => required_points.iter().copied().collect(),
            Self::Grabbed { target } | Self::RotatedTo { target, .. } => vec![*target],
            Self::Proximity { a, b, .. } => vec![*a, *b],
            Self::Custom { .. } | Self::Unresolved { .. } => Vec::new(),
        }
    }

    /// True if any snap anywhere may change the outcome.
    #[must_use]
    pub const fn watches_all_sockets(&self) -> bool {
        matches!(self, Self::AllSnapped { .. })
    }

    /// The custom predicate this condition reads, if any.
    #[must_use]
    pub fn custom_predicate(&self) -> Option<&str> {
        match self {
            Self::Custom { predicate_id } => Some(predicate_id),
            _ => None,
        }
    }
}

fn eval_snapped(
    registry: &ObjectStateRegistry,
    target: ObjectRef,
    expected: Option<ObjectRef>,
) -> bool {
    let snapped_to = registry.state(target).and_then(|s| s.snapped_to);
    let via_object = match (snapped_to, expected) {
        (Some(actual), Some(wanted)) => actual == wanted,
        (Some(_), None) => true,
        (None, _) => false,
    };
    if via_object {
        return true;
    }

    // The target may itself be the socket.
    match (registry.socket_occupant(target), expected) {
        (Some(Some(occupant)), Some(wanted)) => occupant == wanted,
        (Some(Some(_)), None) => true,
        _ => false,
    }
}

fn eval_all_snapped(registry: &ObjectStateRegistry, required: &BTreeSet<ObjectRef>) -> bool {
    let mut points = registry.known_sockets();
    points.extend(required.iter().copied());
    if points.is_empty() {
        return false;
    }
    points
        .iter()
        .all(|p| matches!(registry.socket_occupant(*p), Some(Some(_))))
}

/// The conjunctive requirement carried by a leaf step.
///
/// An empty requirement is the explicit "no conditions" case and is
/// vacuously satisfied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Requirement {
    /// All of these must be met.
    pub conditions: Vec<Condition>,
}

impl Requirement {
    /// A requirement with no conditions.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Returns true if there are no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Vec3;

    #[test]
    fn test_rotated_to_within_tolerance() {
        let knob = ObjectRef::new();
        let cond = Condition::RotatedTo {
            target: knob,
            target_value: 45.0,
            tolerance: 5.0,
        };
        let mut registry = ObjectStateRegistry::new();

        assert!(!cond.evaluate(&registry), "unknown rotation never satisfies");
        registry.upsert_rotation(knob, 44.0);
        assert!(cond.evaluate(&registry));
        registry.upsert_rotation(knob, 51.0);
        assert!(!cond.evaluate(&registry));
        registry.upsert_rotation(knob, 50.0);
        assert!(cond.evaluate(&registry));
    }

    #[test]
    fn test_rotation_default_tolerance_from_json() {
        let knob = ObjectRef::new();
        let json = format!(r#"{{"type":"rotated_to","target":"{knob}","target_value":90.0}}"#);
        let cond: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(
            cond,
            Condition::RotatedTo {
                target: knob,
                target_value: 90.0,
                tolerance: DEFAULT_ROTATION_TOLERANCE,
            }
        );
    }

    #[test]
    fn test_grabbed_unknown_and_false_are_equivalent() {
        let tool = ObjectRef::new();
        let cond = Condition::Grabbed { target: tool };
        let mut registry = ObjectStateRegistry::new();
        assert!(!cond.evaluate(&registry));
        registry.upsert_grab(tool, false);
        assert!(!cond.evaluate(&registry));
        registry.upsert_grab(tool, true);
        assert!(cond.evaluate(&registry));
    }

    #[test]
    fn test_object_snapped_with_counterpart() {
        let plug = ObjectRef::new();
        let right = ObjectRef::new();
        let wrong = ObjectRef::new();
        let cond = Condition::ObjectSnapped {
            target: plug,
            expected_counterpart: Some(right),
        };
        let mut registry = ObjectStateRegistry::new();

        registry.upsert_snap(wrong, plug, true);
        assert!(!cond.evaluate(&registry));
        registry.upsert_snap(right, plug, true);
        assert!(cond.evaluate(&registry));
    }

    #[test]
    fn test_object_snapped_target_is_socket() {
        let socket = ObjectRef::new();
        let plug = ObjectRef::new();
        let cond = Condition::ObjectSnapped {
            target: socket,
            expected_counterpart: None,
        };
        let mut registry = ObjectStateRegistry::new();
        registry.register_socket(socket);
        assert!(!cond.evaluate(&registry));
        registry.upsert_snap(socket, plug, true);
        assert!(cond.evaluate(&registry));
    }

    #[test]
    fn test_all_snapped_covers_sockets_discovered_later() {
        let s1 = ObjectRef::new();
        let s2 = ObjectRef::new();
        let s3 = ObjectRef::new();
        let cond = Condition::AllSnapped {
            required_points: [s1, s2].into_iter().collect(),
        };
        let mut registry = ObjectStateRegistry::new();

        registry.upsert_snap(s1, ObjectRef::new(), true);
        assert!(!cond.evaluate(&registry));
        registry.upsert_snap(s2, ObjectRef::new(), true);
        assert!(cond.evaluate(&registry));

        registry.register_socket(s3);
        assert!(!cond.evaluate(&registry));
        registry.upsert_snap(s3, ObjectRef::new(), true);
        assert!(cond.evaluate(&registry));
    }

    #[test]
    fn test_all_snapped_with_nothing_known_is_unsatisfied() {
        let cond = Condition::AllSnapped {
            required_points: BTreeSet::new(),
        };
        assert!(!cond.evaluate(&ObjectStateRegistry::new()));
    }

    #[test]
    fn test_proximity_requires_both_positions() {
        let hand = ObjectRef::new();
        let valve = ObjectRef::new();
        let cond = Condition::Proximity {
            a: hand,
            b: valve,
            max_distance: 1.0,
        };
        let mut registry = ObjectStateRegistry::new();
        registry.upsert_position(hand, Vec3::new(0.0, 0.0, 0.0));
        assert!(!cond.evaluate(&registry));
        registry.upsert_position(valve, Vec3::new(0.0, 0.5, 0.5));
        assert!(cond.evaluate(&registry));
        registry.upsert_position(valve, Vec3::new(2.0, 0.0, 0.0));
        assert!(!cond.evaluate(&registry));
    }

    #[test]
    fn test_custom_and_unresolved() {
        let mut registry = ObjectStateRegistry::new();
        let custom = Condition::Custom {
            predicate_id: "panel_closed".to_string(),
        };
        assert!(!custom.evaluate(&registry));
        registry.set_custom("panel_closed", true);
        assert!(custom.evaluate(&registry));

        let unresolved = Condition::Unresolved {
            reference: "ghost".to_string(),
        };
        assert!(!unresolved.evaluate(&registry));
    }
}
