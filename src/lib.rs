//! # trainflow - Hierarchical sequencing and gating for procedural training
//!
//! trainflow drives step-by-step procedural training. A trainee performs
//! physical actions (grab a tool, snap a part into a socket, turn a knob,
//! stand near a panel) in a partially ordered sequence. The engine decides
//! which steps are active, detects completion from live interaction facts,
//! advances through steps, groups, modules and the whole program, and
//! derives which actions are currently permitted.
//!
//! ## Core Concepts
//!
//! - **ObjectRef**: Stable identity for a physical interactable
//! - **Condition**: Pure predicate over live object state
//! - **ProgressTree**: Immutable authored hierarchy shared by sessions
//! - **RuntimeState**: Per-session active/completed flags and latches
//! - **Gate**: Actions permitted by the current active frontier
//! - **VolumeOrchestrator**: One training session
//!
//! ## Usage
//!
//! ```rust
//! use trainflow::{
//!     ModuleConfig, NameDirectory, ProgramConfig, StepConfig, TaskGroupConfig,
//!     VolumeOrchestrator, VolumeSettings,
//! };
//!
//! let mut scene = NameDirectory::new();
//! let wrench = scene.register_path("Wrench");
//!
//! let program = ProgramConfig::new("Valve service").with_module(
//!     ModuleConfig::new("Prepare").with_group(
//!         TaskGroupConfig::new("Tools").with_step(StepConfig::grab("Pick up wrench", "Wrench")),
//!     ),
//! );
//! let compiled = program.compile(&scene)?;
//!
//! let mut session = VolumeOrchestrator::from_program(&compiled, VolumeSettings::default());
//! session.start()?;
//! session.notify_grab(wrench, true);
//! assert!(session.is_complete());
//! # Ok::<(), trainflow::TrainingError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod condition;
pub mod error;
pub mod object;
pub mod registry;
pub mod tree;

// Sequencing and gating
pub mod engine;
pub mod events;
pub mod notify;
pub mod volume;

// Authoring and hosting
pub mod config;
pub mod host;

// Re-export primary types at crate root for convenience
pub use condition::{Condition, Requirement, DEFAULT_ROTATION_TOLERANCE};
pub use error::{
    ConfigIssue, ConfigIssueKind, ConfigurationError, SessionError, TrainingError, TrainingResult,
    UnresolvedReference,
};
pub use object::{
    ActionId, NameDirectory, ObjectRef, ObjectResolver, ObjectState, Resolution, Vec3,
};
pub use registry::ObjectStateRegistry;
pub use tree::{
    LockPolicy, NodeId, NodeKind, NodeStatus, ProgressNode, ProgressTree, RuntimeState,
    SessionSnapshot, TreeBuilder,
};

pub use engine::{AdvancePolicy, Engine, Focus, Gate, Transition};
pub use events::{EventBus, EventStream, MistakeSeverity, ObserverId, ResetReason, TrainingEvent};
pub use notify::Notification;
pub use volume::{ActionVerdict, VolumeOrchestrator, VolumeStatistics};

pub use config::{
    CompiledProgram, ConditionSpec, LockPolicyConfig, ModuleConfig, ObjectBinding, ProgramConfig,
    StepConfig, StepType, TaskGroupConfig, VolumeSettings,
};
pub use host::SessionHost;
