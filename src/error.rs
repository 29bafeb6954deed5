//! Error types for trainflow.
//!
//! All errors in trainflow are strongly typed using thiserror.
//! Authoring defects are collected into a [`ConfigurationError`] holding
//! every issue found; runtime failures surface as [`SessionError`].
//! A trainee doing the wrong thing is never an error: those are
//! domain events (see [`crate::events::TrainingEvent`]).

use std::fmt;

use thiserror::Error;

use crate::tree::NodeId;

/// A single defect found while validating an authored program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigIssueKind {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("step type '{step_type}' requires a target reference")]
    MissingTarget { step_type: String },

    #[error("grab-and-snap step requires a destination reference")]
    MissingDestination,

    #[error("turn-knob step requires a target angle")]
    MissingTargetAngle,

    #[error("tolerance {value} must be finite and non-negative")]
    InvalidTolerance { value: f32 },

    #[error("wait-for-condition step has an empty dependency list")]
    EmptyWaitList,

    #[error("dependency on index {index} is invalid: {reason}")]
    InvalidDependency { index: usize, reason: String },

    #[error("duplicate name '{name}' makes resolution ambiguous")]
    DuplicateName { name: String },

    #[error("object name '{name}' matches more than one scene object")]
    AmbiguousName { name: String },

    #[error("show-instruction step requires hint text")]
    MissingInstruction,

    #[error("distance {value} must be finite and non-negative")]
    InvalidDistance { value: f32 },

    #[error("action id cannot be empty")]
    EmptyActionId,

    #[error("all-snapped condition lists no socket points")]
    EmptyPointSet,

    #[error("custom condition requires a predicate id")]
    EmptyPredicateId,
}

/// A located configuration issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    /// Human readable location, e.g. `Program/Module 1/Group A/step[2]`.
    pub path: String,
    /// What is wrong at that location.
    pub kind: ConfigIssueKind,
}

impl ConfigIssue {
    /// Creates an issue at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: ConfigIssueKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// A malformed authored tree. Holds every issue found, in document order.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid training configuration ({} issue(s)): {}", issues.len(), summarize(issues))]
pub struct ConfigurationError {
    /// All issues, in the order they were found.
    pub issues: Vec<ConfigIssue>,
}

fn summarize(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A name-based object reference that could not be resolved.
///
/// Non-fatal: the owning condition degrades to unsatisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved object reference '{name}' at {location}")]
pub struct UnresolvedReference {
    /// The name that failed to resolve.
    pub name: String,
    /// Where in the authored tree the reference appeared.
    pub location: String,
}

/// Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("program '{program}' has no modules to run")]
    EmptyTree { program: String },

    #[error("unknown progress node: {id}")]
    UnknownNode { id: NodeId },

    #[error("session has not been started")]
    NotStarted,

    #[error("node {id} is not an active optional node")]
    NotPassable { id: NodeId },

    #[error("skip-to is disabled for this session (allow_skip = false)")]
    SkipDisabled,

    #[error("channel disconnected: {path}")]
    Disconnected { path: String },

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("session queue full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

/// Top-level error type for trainflow.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Settings error: {message}")]
    Settings { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrainingError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a settings error.
    #[must_use]
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a session error.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Returns true if `Start()` was refused because there is nothing to run.
    #[must_use]
    pub const fn is_empty_tree(&self) -> bool {
        matches!(self, Self::Session(SessionError::EmptyTree { .. }))
    }

    /// Returns the configuration issues, if this is a configuration error.
    #[must_use]
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            Self::Configuration(e) => &e.issues,
            _ => &[],
        }
    }
}

/// Result type alias for trainflow operations.
pub type TrainingResult<T> = Result<T, TrainingError>;
