//! Interaction notifications.
//!
//! Environment adapters report raw interaction facts as [`Notification`]s.
//! The enum mirrors the `notify_*` methods on
//! [`crate::volume::VolumeOrchestrator`] so hosts can queue, log or replay
//! them as plain data.

use serde::{Deserialize, Serialize};

use crate::object::{ObjectRef, Vec3};

/// A single interaction fact reported by the environment.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// `object` was snapped into (or released from) `point`.
    Snap {
        point: ObjectRef,
        object: ObjectRef,
        connected: bool,
    },

    /// `object` was grabbed or released.
    Grab { object: ObjectRef, grabbed: bool },

    /// `object` now sits at `angle` degrees.
    Rotation { object: ObjectRef, angle: f32 },

    /// Periodic position sample for `object`.
    ProximityTick { object: ObjectRef, position: Vec3 },

    /// An externally evaluated predicate changed.
    Custom { predicate_id: String, value: bool },

    /// A snap point became known without an occupant.
    SocketDiscovered { point: ObjectRef },

    /// Per-frame update with no new facts.
    Tick,
}

impl Notification {
    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Snap { .. } => "snap",
            Self::Grab { .. } => "grab",
            Self::Rotation { .. } => "rotation",
            Self::ProximityTick { .. } => "proximity_tick",
            Self::Custom { .. } => "custom",
            Self::SocketDiscovered { .. } => "socket_discovered",
            Self::Tick => "tick",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_entries_parse() {
        let knob = ObjectRef::from_scene_path("Panel/Knob");
        let json = format!(r#"[{{"type":"rotation","object":"{knob}","angle":44.0}},{{"type":"tick"}}]"#);
        let parsed: Vec<Notification> = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed,
            vec![
                Notification::Rotation {
                    object: knob,
                    angle: 44.0
                },
                Notification::Tick
            ]
        );
        assert_eq!(parsed[0].label(), "rotation");
    }
}
