//! Event types emitted by a training session.
//!
//! These types are serializable so hosts can forward them to UI or
//! analytics without translation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::Gate;
use crate::object::ActionId;
use crate::tree::{NodeId, NodeKind};

/// How serious a trainee mistake is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MistakeSeverity {
    /// Cosmetic or easily corrected.
    Minor,
    /// Wrong, but safe to continue.
    Major,
    /// Unsafe; may trigger a reset depending on session policy.
    Critical,
}

impl fmt::Display for MistakeSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for MistakeSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minor" | "low" => Ok(Self::Minor),
            "major" | "medium" => Ok(Self::Major),
            "critical" | "high" => Ok(Self::Critical),
            other => Err(format!("unknown mistake severity '{other}'")),
        }
    }
}

/// Why progress was reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    /// The host asked for it.
    Requested,
    /// A critical mistake under `reset_on_critical_error`.
    CriticalMistake,
    /// The whole session, including object state, was restarted.
    SessionRestart,
}

/// Events emitted by a training session.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainingEvent {
    /// The session started.
    VolumeStarted {
        program: String,
        at: DateTime<Utc>,
    },

    /// A node joined the active frontier.
    NodeActivated {
        node: NodeId,
        kind: NodeKind,
        name: String,
    },

    /// A node completed.
    NodeCompleted {
        node: NodeId,
        kind: NodeKind,
        name: String,
    },

    /// The whole program completed.
    VolumeCompleted {
        program: String,
        at: DateTime<Utc>,
        elapsed_ms: i64,
    },

    /// Progress was reset.
    VolumeReset { reason: ResetReason },

    /// An administrative skip moved the frontier.
    SkippedTo { node: NodeId, name: String },

    /// A module finished and the session waits for an explicit continue.
    AwaitingContinue { completed: NodeId },

    /// The resolved set of permitted actions changed.
    GateChanged { gate: Gate },

    /// A locked action was attempted (hard).
    ActionBlocked { action: ActionId },

    /// A locked action was attempted and tolerated (soft).
    ActionWarning { action: ActionId, message: String },

    /// The host reported a trainee mistake.
    MistakeMade {
        description: String,
        severity: MistakeSeverity,
    },
}

impl TrainingEvent {
    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::VolumeStarted { .. } => "volume_started",
            Self::NodeActivated { .. } => "node_activated",
            Self::NodeCompleted { .. } => "node_completed",
            Self::VolumeCompleted { .. } => "volume_completed",
            Self::VolumeReset { .. } => "volume_reset",
            Self::SkippedTo { .. } => "skipped_to",
            Self::AwaitingContinue { .. } => "awaiting_continue",
            Self::GateChanged { .. } => "gate_changed",
            Self::ActionBlocked { .. } => "action_blocked",
            Self::ActionWarning { .. } => "action_warning",
            Self::MistakeMade { .. } => "mistake_made",
        }
    }
}
